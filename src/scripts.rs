//! Scripts task: concatenate the bundle list and minify
//!
//! The inputs are an explicit ordered list from `[scripts] bundle`, not a
//! glob: what is not listed is not built, which is how retired vendor
//! libraries stay out of the artifact while their files linger in the tree.

use crate::error::{PipelineError, Result};
use crate::minify;
use crate::tasks::{TaskContext, TaskOutput};

const TASK: &str = "js";

pub async fn run(ctx: &TaskContext) -> Result<TaskOutput> {
    let config = &ctx.config;

    let mut bundle = String::new();
    for path in config.script_sources() {
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::stage(TASK, "fs", format!("{}: {}", path.display(), e))
        })?;
        bundle.push_str(&text);
        if !text.ends_with('\n') {
            bundle.push('\n');
        }
    }

    let minified = minify::minify_js(&bundle);

    let out = config.scripts_out();
    if let Some(parent) = out.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::stage(TASK, "fs", e))?;
    }
    tokio::fs::write(&out, &minified)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;

    let summary = format!("{} files -> 1", config.scripts.bundle.len());
    Ok(TaskOutput::new(vec![out], summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use std::sync::Arc;

    fn site_with_bundle(bundle: &[(&str, &str)], list: &[&str]) -> (tempfile::TempDir, TaskContext) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src/js");
        std::fs::create_dir_all(&src).unwrap();
        for (name, content) in bundle {
            std::fs::write(src.join(name), content).unwrap();
        }

        let entries = list
            .iter()
            .map(|n| format!("\"js/{n}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let toml = format!(
            r#"
            [directories]
            source = "{0}/src"
            build = "{0}/build"

            [scripts]
            bundle = [{entries}]
            "#,
            dir.path().display()
        );
        let config: SiteConfig = toml::from_str(&toml).unwrap();
        (dir, TaskContext::new(Arc::new(config)))
    }

    #[tokio::test]
    async fn test_concatenates_in_declared_order() {
        let (dir, ctx) = site_with_bundle(
            &[("a.js", "var first = 1;"), ("b.js", "var second = 2;")],
            &["b.js", "a.js"],
        );

        run(&ctx).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("build/js/script.min.js")).unwrap();
        let second = out.find("second").unwrap();
        let first = out.find("first").unwrap();
        assert!(second < first, "declared order must win: {out}");
    }

    #[tokio::test]
    async fn test_unlisted_files_are_excluded() {
        let (dir, ctx) = site_with_bundle(
            &[("app.js", "var app = 1;"), ("legacy-vendor.js", "var legacy = 1;")],
            &["app.js"],
        );

        run(&ctx).await.unwrap();

        let out = std::fs::read_to_string(dir.path().join("build/js/script.min.js")).unwrap();
        assert!(out.contains("app"));
        assert!(!out.contains("legacy"));
    }

    #[tokio::test]
    async fn test_missing_listed_file_is_a_stage_error() {
        let (_dir, ctx) = site_with_bundle(&[], &["gone.js"]);

        let err = run(&ctx).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("fs"), "{msg}");
        assert!(msg.contains("gone.js"), "{msg}");
    }
}
