//! sitepipe - static-site asset pipeline
//!
//! Compiles the SCSS entry, strips development-only markup from HTML,
//! concatenates and minifies the script bundle, and serves the build
//! directory with live reload. One TOML config, a fixed task graph, and a
//! watch loop that never dies on a broken save.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use console::style;

mod clean;
mod cli;
mod config;
mod deploy;
mod error;
mod executor;
mod graph;
mod markup;
mod minify;
mod reload;
mod scripts;
mod server;
mod styles;
mod tasks;
mod watch;

use cli::{Cli, Commands};
use config::SiteConfig;
use error::{PipelineError, Result};
use executor::{any_failed, Executor};
use graph::PipelineGraph;
use reload::ReloadHub;
use tasks::{TaskContext, TaskKind};

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .without_time()
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        // The plan ran to the end but a task failed: already reported with
        // the failing tool's name, only the exit code is left to set.
        Ok(clean_run) => {
            if clean_run {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    let verbose = cli.verbose;
    let config_path = cli.config.clone();

    match cli.effective_command() {
        Commands::Init { force } => {
            init_site(force)?;
            Ok(true)
        }
        Commands::Check => check(config_path.as_deref()),
        Commands::Deploy => {
            let (config, _) = SiteConfig::load(config_path.as_deref())?;
            deploy::run(&config).await?;
            Ok(true)
        }
        Commands::Clean => run_single(TaskKind::Clean, config_path.as_deref(), verbose).await,
        Commands::Styles => run_single(TaskKind::Styles, config_path.as_deref(), verbose).await,
        Commands::Html => run_single(TaskKind::Markup, config_path.as_deref(), verbose).await,
        Commands::Js => run_single(TaskKind::Scripts, config_path.as_deref(), verbose).await,
        Commands::Build => run_build(config_path.as_deref(), verbose).await,
        Commands::Serve { port, no_open } => {
            serve_site(config_path.as_deref(), verbose, port, no_open).await
        }
    }
}

/// Run one task by itself; ordering edges do not apply
async fn run_single(kind: TaskKind, config_path: Option<&Path>, verbose: bool) -> Result<bool> {
    let (config, _) = SiteConfig::load(config_path)?;
    let ctx = TaskContext::new(Arc::new(config));
    let executor = Executor::new(ctx, verbose);

    let reports = executor.run_plan(&PipelineGraph::single_plan(kind)).await;
    Ok(!any_failed(&reports))
}

/// Run the full pipeline: clean, then styles and js concurrently, then html
async fn run_build(config_path: Option<&Path>, verbose: bool) -> Result<bool> {
    let (config, _) = SiteConfig::load(config_path)?;
    let ctx = TaskContext::new(Arc::new(config));
    let executor = Executor::new(ctx, verbose);

    let graph = PipelineGraph::new()?;
    let reports = executor.run_plan(&graph.full_plan()?).await;
    Ok(!any_failed(&reports))
}

/// Build, then serve the build directory with live reload until Ctrl-C
async fn serve_site(
    config_path: Option<&Path>,
    verbose: bool,
    port: Option<u16>,
    no_open: bool,
) -> Result<bool> {
    let (mut config, _) = SiteConfig::load(config_path)?;
    if let Some(port) = port {
        config.serve.port = port;
    }
    if no_open {
        config.serve.open = false;
    }
    let config = Arc::new(config);

    let hub = ReloadHub::new();
    let ctx = TaskContext::with_reload(Arc::clone(&config), hub.clone());
    let executor = Executor::new(ctx, verbose);

    // Initial build; failures are reported and the server starts anyway so
    // a broken stylesheet can be fixed under the watch loop.
    let graph = PipelineGraph::new()?;
    executor.run_plan(&graph.full_plan()?).await;

    // Bind before anything is spawned or announced: a taken port must fail
    // the command here, not sit in a task handle until shutdown.
    let listener = server::bind(&config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let server = tokio::spawn(server::serve(
        Arc::clone(&config),
        hub.clone(),
        listener,
        shutdown_rx.clone(),
    ));

    let url = format!(
        "http://127.0.0.1:{}{}",
        config.serve.port, config.serve.start_path
    );
    println!(
        "\n{} Serving {} at {}  (Ctrl-C to stop)",
        style("▶").green(),
        style(config.build_dir().display()).bold(),
        style(&url).underlined()
    );

    if config.serve.open {
        if let Err(e) = open::that_detached(&url) {
            tracing::warn!("could not open browser: {e}");
        }
    }

    let source_root = std::fs::canonicalize(config.source_dir())?;
    let rules = watch::rules(&config, &source_root);
    watch::watch_loop(
        executor,
        rules,
        hub,
        source_root,
        config.serve.watch_debounce_ms,
        shutdown_rx,
    )
    .await?;

    match server.await {
        Ok(result) => result?,
        Err(e) => return Err(PipelineError::stage("serve", "http", e)),
    }

    println!("{} Shut down", style("✓").green());
    Ok(true)
}

/// Validate the config and print the pipeline summary
fn check(config_path: Option<&Path>) -> Result<bool> {
    let (config, path) = SiteConfig::load(config_path)?;
    let graph = PipelineGraph::new()?;

    println!("{} {} is valid", style("✓").green(), path.display());
    println!(
        "  source: {}   build: {}",
        style(config.source_dir().display()).bold(),
        style(config.build_dir().display()).bold()
    );
    println!();

    for kind in TaskKind::ALL {
        let deps = graph.dependencies(kind);
        let after = if deps.is_empty() {
            String::new()
        } else {
            let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
            format!("  [after: {}]", names.join(", "))
        };
        println!(
            "  {:<8}{}{}",
            style(kind.name()).cyan().bold(),
            style(kind.description()).dim(),
            style(after).yellow().dim()
        );
    }

    Ok(true)
}

const CONFIG_TEMPLATE: &str = r#"# sitepipe configuration

[directories]
source = "src"
build = "build"

[styles]
entry = "scss/style.scss"
dest = "css"
browsers = ["last 2 versions"]

[scripts]
# Listed files are concatenated in order. Retired vendor libraries stay
# commented out rather than deleted, so they are easy to bring back.
bundle = [
    # "js/jquery-3.1.0.min.js",
    # "js/owl.carousel.min.js",
    "js/script.js",
]
out = "js/script.min.js"

[clean]
keep = ["readme.md"]

[serve]
port = 3000
start_path = "/index.html"
open = true
watch_debounce_ms = 300

[deploy]
remote = "origin"
branch = "gh-pages"
"#;

const STARTER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>sitepipe starter</title>
  <link rel="stylesheet" href="css/style.min.css">
</head>
<body>
  <h1>It works</h1>
  <!--DEV
  <p>Development-only banner: stripped from the build.</p>
  -->
  <script src="js/script.min.js"></script>
</body>
</html>
"#;

const STARTER_SCSS: &str = r#"$accent: #3fa7d6;

body {
  font-family: system-ui, sans-serif;
  color: #222;

  a {
    color: $accent;
  }
}

@media (min-width: 768px) {
  body {
    max-width: 40rem;
    margin: 0 auto;
  }
}
"#;

const STARTER_JS: &str = r#"document.addEventListener("DOMContentLoaded", function () {
  console.log("ready");
});
"#;

const BUILD_README: &str =
    "Build output directory. Everything here except this file is regenerated by `sitepipe build`.\n";

/// Scaffold site.toml and a starter source tree
fn init_site(force: bool) -> Result<()> {
    let config_path = Path::new("site.toml");
    if config_path.exists() && !force {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "site.toml already exists (use --force to overwrite)",
        )));
    }

    std::fs::write(config_path, CONFIG_TEMPLATE)?;

    let files = [
        ("src/index.html", STARTER_HTML),
        ("src/scss/style.scss", STARTER_SCSS),
        ("src/js/script.js", STARTER_JS),
        ("build/readme.md", BUILD_README),
    ];

    for (rel, content) in files {
        let path = Path::new(rel);
        if path.exists() && !force {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }

    println!(
        "{} Created {} and a starter source tree",
        style("✓").green(),
        style("site.toml").bold()
    );

    Ok(())
}
