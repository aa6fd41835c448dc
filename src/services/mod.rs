//! Compiler and linter service seams.
//!
//! The orchestrator never looks inside the compiler or linter; both are
//! consumed through these traits as opaque services. The production
//! implementation is the JSON-over-stdio [`bridge`]; tests drive the
//! pipeline with in-memory fakes.

pub mod bridge;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::project::CompilerOptions;
use crate::store::FileStore;

// ============================================================================
// Raw diagnostic shapes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Message,
}

/// One diagnostic as reported by the compiler service. Positions are 0-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerDiagnostic {
    pub category: DiagnosticCategory,
    pub code: u32,
    pub message: String,
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
    /// Full text of the offending file, when the service has it.
    pub source_text: Option<String>,
}

/// One message as reported by the linter service. Positions are 1-based;
/// severity is the linter's own 0/1/2 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintMessage {
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
    pub severity: u8,
    pub rule_id: Option<String>,
    pub message: String,
}

/// Per-file lint result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintFileResult {
    pub file_path: PathBuf,
    pub error_count: usize,
    pub warning_count: usize,
    pub messages: Vec<LintMessage>,
    pub source: Option<String>,
}

// ============================================================================
// Compiler seam
// ============================================================================

/// One artifact produced by a program emit, keyed by its final path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Result of a full-program compile.
#[derive(Debug)]
pub struct ProgramOutput<P> {
    /// Opaque handle the compiler can reuse on the next compile.
    pub program: P,
    pub emitted: Vec<EmittedFile>,
    /// Syntactic + semantic + option diagnostics, already concatenated.
    pub diagnostics: Vec<CompilerDiagnostic>,
}

/// Result of a single-module transpile.
#[derive(Debug, Clone)]
pub struct TranspileOutput {
    pub output_text: String,
    pub source_map_text: String,
    pub diagnostics: Vec<CompilerDiagnostic>,
}

/// The compile service. Reads sources from the store, never from disk.
pub trait Compiler: Send + Sync {
    /// Retained internal state passed back as a reuse hint.
    type Program: Send;

    /// Compile the whole file set. `prior` lets the service reuse internal
    /// state from the previous program.
    fn compile(
        &self,
        file_names: &[PathBuf],
        options: &CompilerOptions,
        store: &FileStore,
        prior: Option<&Self::Program>,
    ) -> anyhow::Result<ProgramOutput<Self::Program>>;

    /// Transpile exactly one module from in-memory source, reporting
    /// diagnostics scoped to this call only.
    fn transpile_module(
        &self,
        path: &Path,
        source: &str,
        options: &CompilerOptions,
    ) -> anyhow::Result<TranspileOutput>;

    /// Type-check-only diagnostics for a previously compiled program.
    fn pre_emit_diagnostics(&self, program: &Self::Program)
    -> anyhow::Result<Vec<CompilerDiagnostic>>;
}

// ============================================================================
// Linter seam
// ============================================================================

pub trait Linter: Send + Sync {
    fn lint(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<LintFileResult>>;

    /// Render results with a named formatter (for the report writer).
    fn format_report(&self, format: &str, results: &[LintFileResult]) -> anyhow::Result<String>;
}

// ============================================================================
// Test fakes
// ============================================================================
