//! Error types for sitepipe
//!
//! Uses `miette` for pretty error reporting with diagnostic codes and help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sitepipe operations
#[derive(Error, Diagnostic, Debug)]
pub enum PipelineError {
    #[error("Configuration file not found")]
    #[diagnostic(
        code(sitepipe::config::not_found),
        help("Create a site.toml in your project root (try `sitepipe init`), or specify one with --config")
    )]
    ConfigNotFound {
        searched: Vec<PathBuf>,
    },

    #[error("Failed to parse configuration")]
    #[diagnostic(code(sitepipe::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid configuration: {field}")]
    #[diagnostic(code(sitepipe::config::invalid))]
    InvalidConfig {
        field: String,
        #[help]
        reason: Option<String>,
    },

    #[error("Circular task ordering detected: {cycle}")]
    #[diagnostic(code(sitepipe::task::cycle))]
    CyclicDependency {
        cycle: String,
    },

    /// A guarded task failed partway through its pipeline. `tool` names the
    /// collaborator that broke (grass, lightningcss, git, fs, ...) so the
    /// notification can point at the failing stage without killing the runner.
    #[error("{tool} error in task '{task}': {message}")]
    #[diagnostic(code(sitepipe::task::stage))]
    Stage {
        task: &'static str,
        tool: &'static str,
        message: String,
    },

    #[error("Command not found: {command}")]
    #[diagnostic(
        code(sitepipe::exec::command_not_found),
        help("Ensure the command is installed and in your PATH")
    )]
    CommandNotFound {
        command: String,
    },

    #[error("I/O error")]
    #[diagnostic(code(sitepipe::io))]
    Io(#[from] std::io::Error),

    #[error("Watch error")]
    #[diagnostic(code(sitepipe::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },
}

impl PipelineError {
    /// Wrap a collaborator failure as a stage error for the given task.
    pub fn stage(task: &'static str, tool: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            task,
            tool,
            message: err.to_string(),
        }
    }
}

/// Result type alias for sitepipe operations
pub type Result<T> = std::result::Result<T, PipelineError>;
