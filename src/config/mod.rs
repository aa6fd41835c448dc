//! Tool configuration management for `anvil.toml`.
//!
//! | Section   | Purpose                                              |
//! |-----------|------------------------------------------------------|
//! | `[build]` | Paths, template inlining, deep-link rewrite settings |
//! | `[lint]`  | Linter config, type-check gate, report output        |
//!
//! Project (tsconfig-style) configuration is a separate concern and lives in
//! [`project`].

pub mod project;

use owo_colors::OwoColorize;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("project config `{path}` is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    // No #[from]: source() would duplicate the aggregated output
    #[error("{0}")]
    Invalid(ConfigDiagnostics),
}

/// Aggregated validation failures, one entry per invalid field.
///
/// A single load reports every problem at once instead of bailing on the
/// first one.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<(String, String)>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push((field.into(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Convert to Result (Err when any error was recorded).
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self))
        }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "config validation failed:".red().bold())?;
        for (field, message) in &self.errors {
            writeln!(f, "[{}] {} {}", field.cyan(), "→".red(), message)?;
        }
        if self.errors.len() > 1 {
            write!(
                f,
                "{} {} {}",
                "found".dimmed(),
                self.errors.len().to_string().red().bold(),
                "errors".dimmed()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

// ============================================================================
// Root configuration
// ============================================================================

/// Root configuration structure representing anvil.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct AnvilConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub lint: LintSection,

    #[serde(default)]
    pub compiler: CompilerSection,
}

/// `[compiler]` settings: how to reach the compiler/linter services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    /// Command line for the JSON-over-stdio bridge process.
    pub bridge: Vec<String>,
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            bridge: vec!["node".into(), "anvil.bridge.js".into()],
        }
    }
}

/// `[build]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Source directory, relative to root.
    pub src_dir: PathBuf,
    /// Output directory the bundler reads, relative to root.
    pub build_dir: PathBuf,
    /// Project config file, relative to root.
    pub tsconfig: PathBuf,
    /// Inline `templateUrl` content into emitted script.
    pub inline_templates: bool,
    /// Whether the downstream bundler wants source maps.
    pub source_maps: bool,
    /// Rewrite deep-link declarations before compiling.
    pub parse_deep_links: bool,
    /// Aggregation target for the synthesized deep-link config.
    pub app_module: PathBuf,
    /// Filename suffix marking a deep-link declaring file.
    pub deep_link_suffix: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            build_dir: PathBuf::from("www/build"),
            tsconfig: PathBuf::from("tsconfig.json"),
            inline_templates: true,
            source_maps: true,
            parse_deep_links: true,
            app_module: PathBuf::from("src/app/app.module.ts"),
            deep_link_suffix: ".page.ts".into(),
        }
    }
}

/// `[lint]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LintSection {
    /// Linter config file, relative to root.
    pub config: Option<PathBuf>,
    /// Run the full type check as part of linting.
    pub type_check: bool,
    /// Fail the build on lint errors (otherwise log and continue).
    pub bail_on_error: bool,
    /// Formatter name passed to the linter for the report.
    pub format: String,
    /// Report destination; defaults to the log stream.
    pub output_file: Option<PathBuf>,
}

impl Default for LintSection {
    fn default() -> Self {
        Self {
            config: None,
            type_check: false,
            bail_on_error: false,
            format: "stylish".into(),
            output_file: None,
        }
    }
}

impl AnvilConfig {
    /// Load and validate `anvil.toml`.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(config_path)
            .map_err(|e| ConfigError::Io(config_path.to_path_buf(), e))?;

        let mut config: Self = toml::from_str(&raw)?;
        config.config_path = config_path.to_path_buf();
        config.root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if config.root.as_os_str().is_empty() {
            config.root = PathBuf::from(".");
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut diagnostics = ConfigDiagnostics::new();

        if self.build.src_dir.as_os_str().is_empty() {
            diagnostics.error("build.src_dir", "must not be empty");
        }
        if self.build.build_dir.as_os_str().is_empty() {
            diagnostics.error("build.build_dir", "must not be empty");
        }
        if self.build.parse_deep_links {
            if self.build.app_module.as_os_str().is_empty() {
                diagnostics.error(
                    "build.app_module",
                    "required when parse_deep_links is enabled",
                );
            }
            if !self.build.deep_link_suffix.ends_with(".ts") {
                diagnostics.error(
                    "build.deep_link_suffix",
                    "must end with `.ts` so declaring files stay compilable",
                );
            }
        }
        if self.lint.format.is_empty() {
            diagnostics.error("lint.format", "must not be empty");
        }

        diagnostics.into_result()
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join(&self.build.src_dir)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join(&self.build.build_dir)
    }

    pub fn tsconfig_path(&self) -> PathBuf {
        self.root.join(&self.build.tsconfig)
    }

    pub fn app_module_path(&self) -> PathBuf {
        self.root.join(&self.build.app_module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_pass_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anvil.toml");
        fs::write(&path, "").unwrap();

        let config = AnvilConfig::load(&path).unwrap();
        assert_eq!(config.build.src_dir, PathBuf::from("src"));
        assert!(config.build.parse_deep_links);
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn invalid_fields_are_aggregated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anvil.toml");
        fs::write(
            &path,
            r#"
[build]
src_dir = ""
deep_link_suffix = ".page"

[lint]
format = ""
"#,
        )
        .unwrap();

        let err = AnvilConfig::load(&path).unwrap_err();
        let ConfigError::Invalid(diagnostics) = err else {
            panic!("expected aggregated validation error");
        };
        assert_eq!(diagnostics.len(), 3);
        let rendered = diagnostics.to_string();
        assert!(rendered.contains("build.src_dir"));
        assert!(rendered.contains("lint.format"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AnvilConfig::load(Path::new("/nonexistent/anvil.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
