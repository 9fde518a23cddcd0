//! Task execution engine
//!
//! Runs an execution plan: groups sequentially, tasks within a group as
//! concurrent tokio tasks joined at a barrier. A failing task is reported
//! with the name of the tool that broke and the plan keeps going; the one
//! stale artifact is simply not produced. Nothing here ever aborts the
//! process, which is what keeps the serve loop alive through broken saves.

use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::error::PipelineError;
use crate::graph::ExecutionPlan;
use crate::tasks::{self, TaskContext, TaskKind};

/// Result of executing a single task
#[derive(Debug)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub success: bool,
    pub duration: Duration,
    /// Short note for the result line ("4 files", ...)
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl TaskReport {
    fn failure(kind: TaskKind, duration: Duration, err: &PipelineError) -> Self {
        Self {
            kind,
            success: false,
            duration,
            summary: None,
            error: Some(err.to_string()),
        }
    }
}

/// Task executor
#[derive(Clone)]
pub struct Executor {
    ctx: TaskContext,
    verbose: bool,
}

impl Executor {
    pub fn new(ctx: TaskContext, verbose: bool) -> Self {
        Self { ctx, verbose }
    }

    /// Execute a plan: groups in order, group members concurrently.
    /// Returns a report per task; failures are contained, never propagated.
    pub async fn run_plan(&self, plan: &ExecutionPlan) -> Vec<TaskReport> {
        let multi_progress = MultiProgress::new();
        let mut reports = Vec::new();

        for (depth, group) in plan.groups.iter().enumerate() {
            if self.verbose {
                let names: Vec<_> = group.iter().map(|k| k.name()).collect();
                println!(
                    "{}",
                    style(format!("stage {}: {}", depth + 1, names.join(", "))).dim()
                );
            }

            let mut handles = Vec::new();

            for &kind in group {
                let executor = self.clone();
                let mp = multi_progress.clone();

                handles.push((kind, tokio::spawn(async move {
                    let pb = mp.add(ProgressBar::new_spinner());
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("{spinner:.cyan} {msg}")
                            .expect("valid spinner template"),
                    );
                    pb.set_message(format!("Running {kind}"));
                    pb.enable_steady_tick(Duration::from_millis(100));

                    let report = executor.run_one(kind).await;

                    pb.finish_and_clear();
                    report
                })));
            }

            // Join barrier: the next group starts only when every member of
            // this one has finished, successfully or not.
            for (kind, handle) in handles {
                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) => TaskReport {
                        kind,
                        success: false,
                        duration: Duration::ZERO,
                        summary: None,
                        error: Some(format!("task panicked: {e}")),
                    },
                };

                self.print_report(&report);
                reports.push(report);
            }
        }

        self.print_summary(&reports);
        reports
    }

    /// Run a single task and fold any error into its report
    pub async fn run_one(&self, kind: TaskKind) -> TaskReport {
        let start = Instant::now();

        match tasks::run(kind, &self.ctx).await {
            Ok(output) => {
                for artifact in &output.artifacts {
                    tracing::debug!(task = kind.name(), "wrote {}", artifact.display());
                }
                TaskReport {
                    kind,
                    success: true,
                    duration: start.elapsed(),
                    summary: (!output.summary.is_empty()).then_some(output.summary),
                    error: None,
                }
            }
            Err(e) => TaskReport::failure(kind, start.elapsed(), &e),
        }
    }

    /// Print result of a single task
    fn print_report(&self, report: &TaskReport) {
        let status = if report.success {
            style("✓").green()
        } else {
            style("✗").red()
        };

        let duration = format!("{:.2}s", report.duration.as_secs_f64());

        let note = match &report.summary {
            Some(summary) => format!(" {summary}"),
            None => String::new(),
        };

        println!(
            "{} {}{} {}",
            status,
            style(report.kind.name()).bold(),
            style(note).dim(),
            style(duration).dim()
        );

        if let Some(error) = &report.error {
            eprintln!("  {}", style(error).red());
        }
    }

    /// Print execution summary
    fn print_summary(&self, reports: &[TaskReport]) {
        println!();

        let total: Duration = reports.iter().map(|r| r.duration).sum();
        let succeeded = reports.iter().filter(|r| r.success).count();
        let failed = reports.iter().filter(|r| !r.success).count();

        if failed == 0 {
            println!(
                "{} {} tasks completed in {:.2}s",
                style("✓").green().bold(),
                succeeded,
                total.as_secs_f64()
            );
        } else {
            println!(
                "{} {} succeeded, {} failed in {:.2}s",
                style("✗").red().bold(),
                succeeded,
                failed,
                total.as_secs_f64()
            );
        }
    }
}

/// True when any task in the batch failed; one-shot commands use this for
/// the exit code after the whole plan has run.
pub fn any_failed(reports: &[TaskReport]) -> bool {
    reports.iter().any(|r| !r.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::graph::PipelineGraph;
    use std::sync::Arc;

    fn temp_site() -> (tempfile::TempDir, TaskContext) {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
            [directories]
            source = "{0}/src"
            build = "{0}/build"
            "#,
            dir.path().display()
        );
        let config: SiteConfig = toml::from_str(&toml).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        (dir, TaskContext::new(Arc::new(config)))
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_the_plan() {
        // No scss entry and no scripts exist, so styles and js both fail;
        // clean and html still run and succeed (empty inputs are fine).
        let (_dir, ctx) = temp_site();
        let executor = Executor::new(ctx, false);
        let graph = PipelineGraph::new().unwrap();
        let plan = graph.full_plan().unwrap();

        let reports = executor.run_plan(&plan).await;
        assert_eq!(reports.len(), 4);

        let by_kind = |k: TaskKind| reports.iter().find(|r| r.kind == k).unwrap();
        assert!(by_kind(TaskKind::Clean).success);
        assert!(by_kind(TaskKind::Markup).success);
        assert!(!by_kind(TaskKind::Styles).success);
        assert!(!by_kind(TaskKind::Scripts).success);
        assert!(any_failed(&reports));
    }

    #[tokio::test]
    async fn test_stage_errors_name_the_tool() {
        let (_dir, ctx) = temp_site();
        let executor = Executor::new(ctx, false);

        let report = executor.run_one(TaskKind::Scripts).await;
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("fs"));
    }
}
