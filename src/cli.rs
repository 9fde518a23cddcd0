//! CLI command definitions and handling
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// sitepipe - static-site asset pipeline with a live-reloading dev server
#[derive(Parser, Debug)]
#[command(name = "sitepipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to site.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Empty the build directory, keeping the configured files
    Clean,

    /// Compile and postprocess the stylesheet entry
    Styles,

    /// Copy HTML to the build directory, stripping <!--DEV ... --> blocks
    Html,

    /// Concatenate and minify the script bundle
    Js,

    /// Run the full pipeline: clean, then styles and js, then html
    Build,

    /// Build, then serve the build directory with live reload (default)
    Serve {
        /// Port to serve on (overrides serve.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open the browser on startup
        #[arg(long)]
        no_open: bool,
    },

    /// Publish the build directory to the hosting branch
    Deploy,

    /// Scaffold a site.toml and a starter source tree
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Validate site.toml and list the pipeline's tasks
    Check,
}

impl Cli {
    /// The command to run; no subcommand means `serve`, like the original
    /// default task.
    pub fn effective_command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve {
            port: None,
            no_open: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_serve() {
        let cli = Cli::parse_from(["sitepipe"]);
        assert!(matches!(
            cli.effective_command(),
            Commands::Serve {
                port: None,
                no_open: false
            }
        ));
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from(["sitepipe", "serve", "--port", "8080", "--no-open"]);
        match cli.effective_command() {
            Commands::Serve { port, no_open } => {
                assert_eq!(port, Some(8080));
                assert!(no_open);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
