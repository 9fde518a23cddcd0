//! The built-in task set
//!
//! Every task is a named, side-effecting operation over the filesystem:
//! it reads from the source tree, writes to the build tree, and reports
//! the artifacts it produced. Tasks never hand values to each other in
//! memory; one task's file output is the next one's input.

use std::path::PathBuf;
use std::sync::Arc;

use crate::clean;
use crate::config::SiteConfig;
use crate::error::Result;
use crate::markup;
use crate::reload::ReloadHub;
use crate::scripts;
use crate::styles;

/// The pipeline's tasks. The set is fixed; ordering between them is
/// declared in [`TaskKind::after`] and resolved by the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Empty the build directory (keeping the configured files)
    Clean,
    /// Compile, postprocess and minify the stylesheet entry
    Styles,
    /// Copy HTML, stripping development-only blocks
    Markup,
    /// Concatenate and minify the script bundle
    Scripts,
}

impl TaskKind {
    /// All tasks, in registry order
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Clean,
        TaskKind::Styles,
        TaskKind::Scripts,
        TaskKind::Markup,
    ];

    /// CLI-facing task name
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Clean => "clean",
            TaskKind::Styles => "styles",
            TaskKind::Markup => "html",
            TaskKind::Scripts => "js",
        }
    }

    /// One-line description for `check` output
    pub fn description(self) -> &'static str {
        match self {
            TaskKind::Clean => "empty the build directory",
            TaskKind::Styles => "compile and postprocess stylesheets",
            TaskKind::Markup => "copy HTML without development blocks",
            TaskKind::Scripts => "concatenate and minify scripts",
        }
    }

    /// Tasks that must have completed before this one when the full
    /// pipeline runs. Running a task by itself ignores these edges.
    pub fn after(self) -> &'static [TaskKind] {
        match self {
            TaskKind::Clean => &[],
            TaskKind::Styles => &[TaskKind::Clean],
            TaskKind::Scripts => &[TaskKind::Clean],
            TaskKind::Markup => &[TaskKind::Styles, TaskKind::Scripts],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a task needs to run: the immutable configuration and,
/// in serve mode, a handle for pushing live-reload events.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<SiteConfig>,
    pub reload: Option<ReloadHub>,
}

impl TaskContext {
    /// Context for one-shot runs (no live reload attached)
    pub fn new(config: Arc<SiteConfig>) -> Self {
        Self {
            config,
            reload: None,
        }
    }

    /// Context for serve mode
    pub fn with_reload(config: Arc<SiteConfig>, hub: ReloadHub) -> Self {
        Self {
            config,
            reload: Some(hub),
        }
    }
}

/// What a completed task hands back to the executor
#[derive(Debug, Default)]
pub struct TaskOutput {
    /// Files the task wrote or removed
    pub artifacts: Vec<PathBuf>,
    /// Short human-readable note for the result line ("3 files", ...)
    pub summary: String,
}

impl TaskOutput {
    pub fn new(artifacts: Vec<PathBuf>, summary: impl Into<String>) -> Self {
        Self {
            artifacts,
            summary: summary.into(),
        }
    }
}

/// Run a single task to completion.
pub async fn run(kind: TaskKind, ctx: &TaskContext) -> Result<TaskOutput> {
    match kind {
        TaskKind::Clean => clean::run(ctx).await,
        TaskKind::Styles => styles::run(ctx).await,
        TaskKind::Markup => markup::run(ctx).await,
        TaskKind::Scripts => scripts::run(ctx).await,
    }
}
