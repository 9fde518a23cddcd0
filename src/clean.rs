//! Clean task: empty the build directory
//!
//! Deletes every file under the build root except paths matching the
//! configured keep-list (glob exclusion, relative to the build root), then
//! prunes the directories left empty. A missing build directory is success.

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::tasks::{TaskContext, TaskOutput};

const TASK: &str = "clean";

fn keep_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PipelineError::stage(TASK, "glob", format!("'{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::stage(TASK, "glob", e))
}

pub async fn run(ctx: &TaskContext) -> Result<TaskOutput> {
    let build = ctx.config.build_dir();
    if !build.exists() {
        return Ok(TaskOutput::new(Vec::new(), "0 files removed".to_string()));
    }

    let keep = keep_set(&ctx.config.clean.keep)?;
    let mut removed = Vec::new();

    for entry in WalkDir::new(&build).min_depth(1) {
        let entry = entry.map_err(|e| PipelineError::stage(TASK, "fs", e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(&build)
            .expect("walked path is under the build root");
        if keep.is_match(rel) {
            continue;
        }

        std::fs::remove_file(entry.path()).map_err(|e| {
            PipelineError::stage(TASK, "fs", format!("{}: {}", entry.path().display(), e))
        })?;
        removed.push(entry.path().to_path_buf());
    }

    // Prune emptied directories bottom-up; contents_first yields children
    // before their parents.
    for entry in WalkDir::new(&build).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| PipelineError::stage(TASK, "fs", e))?;
        if entry.file_type().is_dir() {
            // Ignore failures: a non-empty dir still holds kept files.
            let _ = std::fs::remove_dir(entry.path());
        }
    }

    let summary = format!("{} files removed", removed.len());
    Ok(TaskOutput::new(removed, summary))
}
