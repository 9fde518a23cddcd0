//! Markup task: copy HTML, stripping development-only blocks
//!
//! Pages directly under the source root (non-recursive) are copied to the
//! build root byte-for-byte, except for comment blocks of the form
//! `<!--DEV ... -->`. Everything from the newline preceding the marker
//! through the nearest closing `-->` is removed, so markup that only exists
//! for development (dummy nav states, placeholder banners) never ships.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::tasks::{TaskContext, TaskOutput};

const TASK: &str = "html";

/// From the preceding newline (plus any whitespace run) through the nearest
/// `-->`: non-greedy, spans lines, case-sensitive.
static DEV_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\n\s*<!--DEV.+?-->").expect("valid regex"));

/// Remove every well-formed `<!--DEV ... -->` block
pub fn strip_dev_blocks(html: &str) -> Cow<'_, str> {
    DEV_BLOCK.replace_all(html, "")
}

pub async fn run(ctx: &TaskContext) -> Result<TaskOutput> {
    let config = &ctx.config;
    let build = config.build_dir();

    tokio::fs::create_dir_all(&build)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;

    let pattern = format!("{}/*.html", config.source_dir().display());
    let entries = glob::glob(&pattern)
        .map_err(|e| PipelineError::stage(TASK, "glob", e))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::stage(TASK, "glob", e))?;
        let Some(name) = path.file_name() else {
            continue;
        };

        let html = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::stage(TASK, "fs", format!("{}: {}", path.display(), e))
        })?;

        let stripped = strip_dev_blocks(&html);
        let out = build.join(name);
        tokio::fs::write(&out, stripped.as_bytes())
            .await
            .map_err(|e| PipelineError::stage(TASK, "fs", e))?;
        artifacts.push(out);
    }

    let summary = format!("{} files", artifacts.len());
    Ok(TaskOutput::new(artifacts, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::tasks::TaskContext;
    use std::sync::Arc;

    #[test]
    fn test_strips_multiline_dev_block() {
        let html = "<p>A</p>\n<!--DEV\n<p>B</p>\n-->\n<p>C</p>";
        assert_eq!(strip_dev_blocks(html), "<p>A</p>\n<p>C</p>");
    }

    #[test]
    fn test_strips_multiple_blocks() {
        let html = "a\n<!--DEV one -->\nb\n<!--DEV two -->\nc";
        assert_eq!(strip_dev_blocks(html), "a\nb\nc");
    }

    #[test]
    fn test_block_is_non_greedy() {
        let html = "keep\n<!--DEV gone --> stays <!-- normal comment -->";
        assert_eq!(
            strip_dev_blocks(html),
            "keep stays <!-- normal comment -->"
        );
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let html = "a\n<!--dev lowercase -->";
        assert_eq!(strip_dev_blocks(html), html);
    }

    #[test]
    fn test_block_at_start_of_file_is_kept() {
        // No preceding newline, so the anchor never matches
        let html = "<!--DEV first -->\n<p>rest</p>";
        assert_eq!(strip_dev_blocks(html), html);
    }

    #[test]
    fn test_indented_marker_is_stripped_with_its_indent() {
        let html = "<ul>\n  <!--DEV\n  <li>draft</li>\n  -->\n</ul>";
        assert_eq!(strip_dev_blocks(html), "<ul>\n</ul>");
    }

    #[tokio::test]
    async fn test_run_copies_top_level_html_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("partials")).unwrap();
        std::fs::write(src.join("index.html"), "<p>A</p>\n<!--DEV\nx\n-->\n<p>C</p>").unwrap();
        std::fs::write(src.join("partials/nested.html"), "<p>nested</p>").unwrap();
        std::fs::write(src.join("notes.txt"), "ignored").unwrap();

        let toml = format!(
            r#"
            [directories]
            source = "{0}/src"
            build = "{0}/build"
            "#,
            dir.path().display()
        );
        let config: SiteConfig = toml::from_str(&toml).unwrap();
        let ctx = TaskContext::new(Arc::new(config));

        let output = run(&ctx).await.unwrap();
        assert_eq!(output.artifacts.len(), 1);

        let built = std::fs::read_to_string(dir.path().join("build/index.html")).unwrap();
        assert_eq!(built, "<p>A</p>\n<p>C</p>");
        assert!(!dir.path().join("build/partials").exists());
        assert!(!dir.path().join("build/notes.txt").exists());
    }
}
