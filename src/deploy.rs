//! Deploy task: publish the build directory to a hosting branch
//!
//! Manually invoked only, never part of build or serve. The build tree is
//! copied into a scratch directory, committed as a fresh single-commit
//! history, and force-pushed to the configured branch with the system git.

use std::path::Path;
use std::process::Stdio;

use chrono::Utc;
use console::style;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::SiteConfig;
use crate::error::{PipelineError, Result};

const TASK: &str = "deploy";

pub async fn run(config: &SiteConfig) -> Result<()> {
    which::which("git").map_err(|_| PipelineError::CommandNotFound {
        command: "git".to_string(),
    })?;

    let build = config.build_dir();
    if !has_files(&build) {
        return Err(PipelineError::stage(
            TASK,
            "fs",
            format!(
                "{} is empty; run `sitepipe build` before deploying",
                build.display()
            ),
        ));
    }

    let remote_url = resolve_remote(&config.deploy.remote).await?;
    let branch = &config.deploy.branch;

    let scratch = std::env::temp_dir().join(format!("sitepipe-deploy-{}", std::process::id()));
    if scratch.exists() {
        std::fs::remove_dir_all(&scratch).map_err(|e| PipelineError::stage(TASK, "fs", e))?;
    }
    copy_tree(&build, &scratch)?;

    let publish = async {
        git(&scratch, &["init", "--quiet"]).await?;
        git(&scratch, &["add", "-A"]).await?;
        let message = format!("publish {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        git(&scratch, &["commit", "--quiet", "-m", &message]).await?;
        git(
            &scratch,
            &[
                "push",
                "--force",
                "--quiet",
                &remote_url,
                &format!("HEAD:{branch}"),
            ],
        )
        .await
    };

    let result = publish.await;
    // Scratch clone is disposable either way
    let _ = std::fs::remove_dir_all(&scratch);
    result?;

    println!(
        "{} Published {} to {} ({})",
        style("✓").green(),
        style(build.display()).bold(),
        style(branch).bold(),
        remote_url
    );
    Ok(())
}

fn has_files(dir: &Path) -> bool {
    dir.exists()
        && WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
}

/// A remote is either a URL/scp-style address used as-is, or the name of a
/// configured remote resolved through `git config`.
async fn resolve_remote(remote: &str) -> Result<String> {
    if looks_like_url(remote) {
        return Ok(remote.to_string());
    }

    let output = Command::new("git")
        .args(["config", "--get", &format!("remote.{remote}.url")])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PipelineError::stage(TASK, "git", e))?;

    if !output.status.success() {
        return Err(PipelineError::stage(
            TASK,
            "git",
            format!("remote '{remote}' is not configured and is not a URL"),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn looks_like_url(remote: &str) -> bool {
    remote.contains("://") || (remote.contains(':') && remote.contains('@'))
}

/// Copy every file under `from` into `to`, preserving relative paths
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| PipelineError::stage(TASK, "fs", e))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .expect("walked path is under the source root");
        let dest = to.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| PipelineError::stage(TASK, "fs", e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::stage(TASK, "fs", e))?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| {
                PipelineError::stage(TASK, "fs", format!("{}: {}", entry.path().display(), e))
            })?;
        }
    }
    Ok(())
}

/// Run one git command in `cwd`, surfacing stderr on failure
async fn git(cwd: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PipelineError::stage(TASK, "git", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::stage(
            TASK,
            "git",
            format!("git {} failed: {}", args.first().unwrap_or(&""), stderr.trim()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(looks_like_url("https://github.com/me/site.git"));
        assert!(looks_like_url("git@github.com:me/site.git"));
        assert!(!looks_like_url("origin"));
        assert!(!looks_like_url("upstream"));
    }

    #[test]
    fn test_copy_tree_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        std::fs::create_dir_all(from.join("css")).unwrap();
        std::fs::write(from.join("index.html"), "a").unwrap();
        std::fs::write(from.join("css/style.css"), "b").unwrap();

        copy_tree(&from, &to).unwrap();

        assert_eq!(std::fs::read_to_string(to.join("index.html")).unwrap(), "a");
        assert_eq!(
            std::fs::read_to_string(to.join("css/style.css")).unwrap(),
            "b"
        );
    }

    #[test]
    fn test_empty_build_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_files(dir.path()));

        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        assert!(!has_files(dir.path()));

        std::fs::write(dir.path().join("sub/f.txt"), "x").unwrap();
        assert!(has_files(dir.path()));
    }
}
