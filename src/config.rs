//! Configuration parsing for site.toml
//!
//! Handles loading and validating the pipeline configuration. The config is
//! read once at startup and shared immutably with every task; nothing here
//! is consulted through globals.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["site.toml", "Site.toml"];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Source and build directory roots
    #[serde(default)]
    pub directories: Directories,

    /// Stylesheet pipeline settings
    #[serde(default)]
    pub styles: StylesConfig,

    /// Script bundle settings
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Clean task settings
    #[serde(default)]
    pub clean: CleanConfig,

    /// Dev server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Publish settings
    #[serde(default)]
    pub deploy: DeployConfig,
}

/// Source and build directory roots. Tilde and `$VAR` references are
/// expanded when the config is loaded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Directories {
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_build")]
    pub build: String,
}

fn default_source() -> String {
    "src".into()
}

fn default_build() -> String {
    "build".into()
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            source: default_source(),
            build: default_build(),
        }
    }
}

/// Stylesheet pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StylesConfig {
    /// Preprocessor entry file, relative to the source directory
    #[serde(default = "default_styles_entry")]
    pub entry: String,

    /// Output directory for compiled CSS, relative to the build directory
    #[serde(default = "default_styles_dest")]
    pub dest: String,

    /// Browserslist-style support range driving vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

fn default_styles_entry() -> String {
    "scss/style.scss".into()
}

fn default_styles_dest() -> String {
    "css".into()
}

fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".into()]
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_styles_entry(),
            dest: default_styles_dest(),
            browsers: default_browsers(),
        }
    }
}

/// Script bundle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Files to concatenate, in order, relative to the source directory.
    /// An explicit list rather than a glob: what is not listed is not built.
    #[serde(default = "default_bundle")]
    pub bundle: Vec<String>,

    /// Output file, relative to the build directory
    #[serde(default = "default_scripts_out")]
    pub out: String,
}

fn default_bundle() -> Vec<String> {
    vec!["js/script.js".into()]
}

fn default_scripts_out() -> String {
    "js/script.min.js".into()
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            bundle: default_bundle(),
            out: default_scripts_out(),
        }
    }
}

/// Clean task settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    /// Paths under the build directory that clean must not delete
    /// (glob patterns, relative to the build directory)
    #[serde(default = "default_keep")]
    pub keep: Vec<String>,
}

fn default_keep() -> Vec<String> {
    vec!["readme.md".into()]
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
        }
    }
}

/// Dev server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the browser opens when the server starts
    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// Open the browser on startup
    #[serde(default = "default_true")]
    pub open: bool,

    /// Watch debounce delay in milliseconds
    #[serde(default = "default_debounce")]
    pub watch_debounce_ms: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_start_path() -> String {
    "/index.html".into()
}

fn default_true() -> bool {
    true
}

fn default_debounce() -> u64 {
    300
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            start_path: default_start_path(),
            open: default_true(),
            watch_debounce_ms: default_debounce(),
        }
    }
}

/// Publish settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Remote to push to: a configured remote name or a full URL
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch the build directory contents are published to
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "gh-pages".into()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    p.to_path_buf()
                } else {
                    return Err(PipelineError::ConfigNotFound {
                        searched: vec![p.to_path_buf()],
                    });
                }
            }
            None => Self::find_config()?,
        };

        let content = std::fs::read_to_string(&config_path)?;
        let mut config: SiteConfig =
            toml::from_str(&content).map_err(|e| PipelineError::ConfigParse {
                source: e,
                path: config_path.clone(),
            })?;

        config.expand_directories()?;
        config.validate()?;

        Ok((config, config_path))
    }

    /// Search for a config file starting from the current directory
    fn find_config() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        let mut searched = Vec::new();

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                searched.push(candidate.clone());
                if candidate.exists() {
                    return Ok(candidate);
                }
            }

            if !current.pop() {
                break;
            }
        }

        Err(PipelineError::ConfigNotFound { searched })
    }

    /// Expand `~` and environment references in the directory paths
    fn expand_directories(&mut self) -> Result<()> {
        for (field, value) in [
            ("directories.source", &mut self.directories.source),
            ("directories.build", &mut self.directories.build),
        ] {
            let expanded =
                shellexpand::full(value.as_str()).map_err(|e| PipelineError::InvalidConfig {
                    field: field.to_string(),
                    reason: Some(e.to_string()),
                })?;
            *value = expanded.into_owned();
        }
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| PipelineError::InvalidConfig {
            field: field.to_string(),
            reason: Some(reason.to_string()),
        };

        if self.directories.source.is_empty() {
            return Err(invalid("directories.source", "must not be empty"));
        }
        if self.directories.build.is_empty() {
            return Err(invalid("directories.build", "must not be empty"));
        }
        if self.source_dir() == self.build_dir() {
            return Err(invalid(
                "directories",
                "source and build must be different directories; clean would delete the sources",
            ));
        }
        if self.styles.entry.is_empty() {
            return Err(invalid("styles.entry", "must name the preprocessor entry file"));
        }
        if self.scripts.bundle.is_empty() {
            return Err(invalid(
                "scripts.bundle",
                "must list at least one script to concatenate",
            ));
        }
        if self.scripts.out.is_empty() {
            return Err(invalid("scripts.out", "must name the bundled output file"));
        }
        if self.serve.port == 0 {
            return Err(invalid("serve.port", "must be a non-zero port"));
        }
        if !self.serve.start_path.starts_with('/') {
            return Err(invalid("serve.start_path", "must start with '/'"));
        }

        Ok(())
    }

    /// Source directory root
    pub fn source_dir(&self) -> PathBuf {
        PathBuf::from(&self.directories.source)
    }

    /// Build directory root
    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from(&self.directories.build)
    }

    /// Absolute path of the styles entry file
    pub fn styles_entry(&self) -> PathBuf {
        self.source_dir().join(&self.styles.entry)
    }

    /// Directory compiled stylesheets are written to
    pub fn styles_dest(&self) -> PathBuf {
        self.build_dir().join(&self.styles.dest)
    }

    /// Script files to concatenate, in declared order
    pub fn script_sources(&self) -> Vec<PathBuf> {
        self.scripts
            .bundle
            .iter()
            .map(|rel| self.source_dir().join(rel))
            .collect()
    }

    /// Bundled script output path
    pub fn scripts_out(&self) -> PathBuf {
        self.build_dir().join(&self.scripts.out)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            directories: Directories::default(),
            styles: StylesConfig::default(),
            scripts: ScriptsConfig::default(),
            clean: CleanConfig::default(),
            serve: ServeConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}
