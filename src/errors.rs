//! Typed build errors.
//!
//! Every stage fails with its own error type; [`BuildError`] is the umbrella
//! the CLI and watch loop match on. Diagnostics are always printed before one
//! of these is raised, so the message here is the short trailer, not the
//! source listing.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Non-empty compiler diagnostics for a compile pass.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    /// Set by the incremental path: the single file that failed.
    pub path: Option<PathBuf>,
}

impl CompileError {
    /// Full-program failure. The message is stable; downstream tooling greps it.
    pub fn program() -> Self {
        Self {
            message: "Failed to transpile program".into(),
            path: None,
        }
    }

    /// Single-file failure from the incremental path (recoverable).
    pub fn file(path: PathBuf) -> Self {
        Self {
            message: format!("Failed to transpile file - {}", path.display()),
            path: Some(path),
        }
    }
}

/// One or more files with nonzero lint error/warning counts.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LintError {
    pub message: String,
}

/// The deep-link aggregation target is missing or unusable.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("deep-link aggregation target not found in store: `{0}`")]
    TargetMissing(PathBuf),

    #[error("could not parse deep-link declaration in `{path}`: {reason}")]
    BadDeclaration { path: PathBuf, reason: String },
}

/// Diagnostics worker could not be started. Send failures are not errors:
/// they surface as a `Crashed` outcome so the manager can respawn.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn diagnostics worker")]
    Spawn(#[source] std::io::Error),
}

/// Umbrella error for a build pass.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Lint(#[from] LintError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl BuildError {
    /// Incremental compile failures are recoverable: the watch loop retries
    /// with a full build instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Compile(CompileError { path: Some(_), .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_failure_message_is_stable() {
        assert_eq!(CompileError::program().to_string(), "Failed to transpile program");
    }

    #[test]
    fn file_failure_carries_path() {
        let err = CompileError::file(PathBuf::from("/app/src/home.ts"));
        assert!(err.to_string().starts_with("Failed to transpile file - "));
        assert!(BuildError::from(err).is_recoverable());
    }

    #[test]
    fn program_failure_is_not_recoverable() {
        assert!(!BuildError::from(CompileError::program()).is_recoverable());
    }
}
