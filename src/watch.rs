//! File watching for automatic task re-runs
//!
//! Uses `notify` with debouncing. The serve loop owns an explicit
//! subscription table: each [`WatchRule`] binds glob patterns to the task to
//! re-run, plus a flag for whether a full browser reload follows (styles
//! push their own CSS update from inside the task). The loop runs until the
//! shutdown channel flips.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::{mpsc, watch};

use crate::config::SiteConfig;
use crate::error::{PipelineError, Result};
use crate::executor::Executor;
use crate::reload::{ReloadEvent, ReloadHub};
use crate::tasks::TaskKind;

/// One entry in the subscription table
#[derive(Debug)]
pub struct WatchRule {
    /// Glob patterns over absolute paths
    pub patterns: Vec<String>,
    /// Task to re-run when a matching file changes
    pub task: TaskKind,
    /// Send a full reload after a successful re-run
    pub reload_after: bool,
}

impl WatchRule {
    fn glob_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            let glob = Glob::new(pattern).map_err(|e| PipelineError::Watch {
                source: notify::Error::generic(&format!("invalid glob '{pattern}': {e}")),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| PipelineError::Watch {
            source: notify::Error::generic(&format!("failed to build glob set: {e}")),
        })
    }
}

/// Path rendered for use inside a glob pattern. Separators must be `/`:
/// globset treats `\` in a pattern as an escape, so a Windows path pasted
/// verbatim would never match anything.
fn glob_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// The three watch rules of the serve loop: HTML, the styles tree, and the
/// script sources. Patterns are rooted at the resolved source directory.
pub fn rules(config: &SiteConfig, source_root: &Path) -> Vec<WatchRule> {
    let root = glob_path(source_root);

    let styles_ext = Path::new(&config.styles.entry)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("scss")
        .to_string();
    let styles_dir = Path::new(&config.styles.entry)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| format!("{}/{}", root, glob_path(p)))
        .unwrap_or_else(|| root.clone());

    let mut script_dirs: Vec<String> = config
        .scripts
        .bundle
        .iter()
        .map(|rel| {
            Path::new(rel)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| format!("{}/{}", root, glob_path(p)))
                .unwrap_or_else(|| root.clone())
        })
        .collect();
    script_dirs.sort();
    script_dirs.dedup();

    vec![
        WatchRule {
            patterns: vec![format!("{root}/*.html")],
            task: TaskKind::Markup,
            reload_after: true,
        },
        WatchRule {
            // The whole styles tree: partials pulled in by the entry file
            // trigger a recompile too.
            patterns: vec![format!("{styles_dir}/**/*.{styles_ext}")],
            task: TaskKind::Styles,
            reload_after: false,
        },
        WatchRule {
            patterns: script_dirs
                .into_iter()
                .map(|dir| format!("{dir}/*.js"))
                .collect(),
            task: TaskKind::Scripts,
            reload_after: true,
        },
    ]
}

/// Watch the source tree and re-run bound tasks until shutdown
pub async fn watch_loop(
    executor: Executor,
    rules: Vec<WatchRule>,
    hub: ReloadHub,
    source_root: PathBuf,
    debounce_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let compiled: Vec<(GlobSet, &WatchRule)> = rules
        .iter()
        .map(|rule| rule.glob_set().map(|set| (set, rule)))
        .collect::<Result<_>>()?;

    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(16);
    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_ms),
        move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
            if let Ok(events) = events {
                let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                let _ = tx.blocking_send(paths);
            }
        },
    )
    .map_err(|e| PipelineError::Watch { source: e })?;

    debouncer
        .watcher()
        .watch(&source_root, RecursiveMode::Recursive)
        .map_err(|e| PipelineError::Watch { source: e })?;

    println!(
        "{} Watching {} for changes",
        style("👀").cyan(),
        style(source_root.display()).bold()
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            batch = rx.recv() => {
                let Some(paths) = batch else { break };
                handle_batch(&executor, &compiled, &hub, &paths).await;
            }
        }
    }

    Ok(())
}

/// Re-run every rule the batch touches, then fire its post-hook
async fn handle_batch(
    executor: &Executor,
    rules: &[(GlobSet, &WatchRule)],
    hub: &ReloadHub,
    paths: &[PathBuf],
) {
    for (set, rule) in rules {
        let touched: Vec<&PathBuf> = paths.iter().filter(|p| set.is_match(p)).collect();
        if touched.is_empty() {
            continue;
        }

        println!(
            "\n{} {}",
            style("changed:").yellow(),
            touched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let report = executor.run_one(rule.task).await;
        if let Some(error) = &report.error {
            println!(
                "{} {} {}",
                style("✗").red(),
                style(rule.task.name()).bold(),
                style(error).red()
            );
            continue;
        }

        println!("{} {}", style("✓").green(), style(rule.task.name()).bold());
        if rule.reload_after {
            hub.send(ReloadEvent::Reload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    fn config() -> SiteConfig {
        toml::from_str(
            r#"
            [directories]
            source = "site/src"
            build = "site/build"

            [scripts]
            bundle = ["js/vendor.js", "js/app.js", "lib/extra.js"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_rules_cover_the_three_source_kinds() {
        let config = config();
        let rules = rules(&config, Path::new("/abs/site/src"));

        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].task, TaskKind::Markup);
        assert_eq!(rules[0].patterns, vec!["/abs/site/src/*.html"]);
        assert!(rules[0].reload_after);

        assert_eq!(rules[1].task, TaskKind::Styles);
        assert_eq!(rules[1].patterns, vec!["/abs/site/src/scss/**/*.scss"]);
        assert!(!rules[1].reload_after, "styles push their own CSS update");

        assert_eq!(rules[2].task, TaskKind::Scripts);
        assert_eq!(
            rules[2].patterns,
            vec!["/abs/site/src/js/*.js", "/abs/site/src/lib/*.js"]
        );
        assert!(rules[2].reload_after);
    }

    #[test]
    fn test_rule_globs_match_expected_paths() {
        let config = config();
        let rules = rules(&config, Path::new("/abs/site/src"));

        let html = rules[0].glob_set().unwrap();
        assert!(html.is_match("/abs/site/src/index.html"));
        assert!(!html.is_match("/abs/site/src/partials/nav.html"));

        let styles = rules[1].glob_set().unwrap();
        assert!(styles.is_match("/abs/site/src/scss/style.scss"));
        assert!(styles.is_match("/abs/site/src/scss/blocks/_nav.scss"));
        assert!(!styles.is_match("/abs/site/src/scss/style.css"));

        let scripts = rules[2].glob_set().unwrap();
        assert!(scripts.is_match("/abs/site/src/js/app.js"));
        assert!(!scripts.is_match("/abs/site/src/js/vendor/jquery.js"));
    }

    #[test]
    fn test_patterns_use_forward_slashes() {
        // Backslash is a glob escape; a Windows root must come out with '/'
        let config = config();
        let rules = rules(&config, Path::new(r"C:\site\src"));

        assert_eq!(rules[0].patterns, vec!["C:/site/src/*.html"]);
        assert_eq!(rules[1].patterns, vec!["C:/site/src/scss/**/*.scss"]);
        for pattern in rules.iter().flat_map(|r| &r.patterns) {
            assert!(!pattern.contains('\\'), "{pattern}");
        }
    }

    fn scaffold_site() -> (tempfile::TempDir, SiteConfig) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("scss")).unwrap();
        std::fs::create_dir_all(src.join("js")).unwrap();
        std::fs::write(
            src.join("index.html"),
            "<p>A</p>\n<!--DEV\n<p>B</p>\n-->\n<p>C</p>",
        )
        .unwrap();
        std::fs::write(src.join("scss/style.scss"), "body { color: #222; }").unwrap();
        std::fs::write(src.join("js/script.js"), "console.log(1);\n").unwrap();

        let toml = format!(
            r#"
            [directories]
            source = "{0}/src"
            build = "{0}/build"
            "#,
            dir.path().display()
        );
        (dir, toml::from_str(&toml).unwrap())
    }

    fn compiled(rules: &[WatchRule]) -> Vec<(GlobSet, &WatchRule)> {
        rules
            .iter()
            .map(|rule| (rule.glob_set().unwrap(), rule))
            .collect()
    }

    #[tokio::test]
    async fn test_html_batch_reruns_markup_and_reloads() {
        let (dir, config) = scaffold_site();
        let src = dir.path().join("src");
        let config = std::sync::Arc::new(config);

        let hub = ReloadHub::new();
        let ctx = crate::tasks::TaskContext::with_reload(std::sync::Arc::clone(&config), hub.clone());
        let executor = Executor::new(ctx, false);

        let rules = rules(&config, &src);
        let compiled = compiled(&rules);
        let mut rx = hub.subscribe();

        handle_batch(&executor, &compiled, &hub, &[src.join("index.html")]).await;

        let built = std::fs::read_to_string(dir.path().join("build/index.html")).unwrap();
        assert_eq!(built, "<p>A</p>\n<p>C</p>");
        assert_eq!(rx.try_recv().unwrap(), ReloadEvent::Reload);
        assert!(rx.try_recv().is_err(), "one reload per batch");
    }

    #[tokio::test]
    async fn test_styles_batch_pushes_css_update_without_reload() {
        let (dir, config) = scaffold_site();
        let src = dir.path().join("src");
        let config = std::sync::Arc::new(config);

        let hub = ReloadHub::new();
        let ctx = crate::tasks::TaskContext::with_reload(std::sync::Arc::clone(&config), hub.clone());
        let executor = Executor::new(ctx, false);

        let rules = rules(&config, &src);
        let compiled = compiled(&rules);
        let mut rx = hub.subscribe();

        handle_batch(&executor, &compiled, &hub, &[src.join("scss/style.scss")]).await;

        assert!(dir.path().join("build/css/style.css").exists());
        // The task streams the stylesheet itself; no full page reload follows
        assert_eq!(rx.try_recv().unwrap(), ReloadEvent::CssUpdate);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unmatched_batch_runs_nothing() {
        let (dir, config) = scaffold_site();
        let src = dir.path().join("src");
        let config = std::sync::Arc::new(config);

        let hub = ReloadHub::new();
        let ctx = crate::tasks::TaskContext::with_reload(std::sync::Arc::clone(&config), hub.clone());
        let executor = Executor::new(ctx, false);

        let rules = rules(&config, &src);
        let compiled = compiled(&rules);
        let mut rx = hub.subscribe();

        handle_batch(&executor, &compiled, &hub, &[src.join("notes.txt")]).await;

        assert!(!dir.path().join("build").exists());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let rule = WatchRule {
            patterns: vec!["{broken".to_string()],
            task: TaskKind::Markup,
            reload_after: true,
        };
        assert!(rule.glob_set().is_err());
    }
}
