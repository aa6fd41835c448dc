//! Lint pipeline.
//!
//! Two gates run back to back: an optional whole-program type check using the
//! compile session's retained program, then the linter itself. Both feed the
//! shared diagnostics normalizer so lint findings render exactly like compile
//! findings. Lint failures only fail the build when `lint.bail_on_error` is
//! set; the type-check gate always does.

pub mod report;

use std::path::PathBuf;

use rustc_hash::FxHashSet;

use crate::config::AnvilConfig;
use crate::core::BuildContext;
use crate::diagnostics::print::print_diagnostics;
use crate::diagnostics::{Diagnostic, DiagnosticSource, normalize_compiler, normalize_lint};
use crate::errors::{BuildError, LintError};
use crate::services::{Compiler, Linter};

pub const TYPE_CHECK_HEADER: &str = "The following files failed type checking:";
pub const LINT_HEADER: &str = "The following files did not pass lint:";

/// Run the lint pipeline over `files`.
///
/// `program` is the retained handle from the last successful compile; without
/// one the type-check gate is skipped even when configured, since there is
/// nothing to check against.
pub fn run_lint<C: Compiler, L: Linter>(
    ctx: &BuildContext,
    config: &AnvilConfig,
    compiler: &C,
    program: Option<&C::Program>,
    linter: &L,
    files: &[PathBuf],
) -> Result<(), BuildError> {
    ctx.clear_diagnostics(DiagnosticSource::Linter);

    if config.lint.type_check {
        match program {
            Some(program) => type_check(ctx, compiler, program)?,
            None => crate::debug!("lint"; "type check requested but no program is retained"),
        }
    }

    let results = linter.lint(files).map_err(|e| LintError {
        message: format!("linter service failed: {e:#}"),
    })?;

    report::write_report(config, linter, &results);

    let mut failing = Vec::new();
    for result in &results {
        if result.error_count == 0 && result.warning_count == 0 {
            continue;
        }
        let diagnostics = normalize_lint(&ctx.root_dir, result);
        ctx.record_diagnostics(&diagnostics);
        print_diagnostics(&diagnostics);
        // Warnings count against the gate the same as errors.
        failing.push(result.file_path.clone());
    }

    if !failing.is_empty() {
        let message =
            generate_error_message_for_files(LINT_HEADER, &remove_duplicate_file_names(&failing));
        if config.lint.bail_on_error {
            return Err(LintError { message }.into());
        }
        crate::log!("lint"; "{message}");
    }

    Ok(())
}

/// Whole-program diagnostics against the retained program. Any finding fails
/// the pipeline; unlike plain lint errors this is never downgraded to a log
/// line.
fn type_check<C: Compiler>(
    ctx: &BuildContext,
    compiler: &C,
    program: &C::Program,
) -> Result<(), BuildError> {
    let raw = compiler.pre_emit_diagnostics(program).map_err(|e| LintError {
        message: format!("type check failed to run: {e:#}"),
    })?;
    if raw.is_empty() {
        return Ok(());
    }

    let diagnostics: Vec<Diagnostic> = raw
        .iter()
        .map(|d| normalize_compiler(&ctx.root_dir, d))
        .collect();
    ctx.record_diagnostics(&diagnostics);
    print_diagnostics(&diagnostics);

    let files: Vec<PathBuf> = diagnostics.iter().map(|d| d.rel_path.clone()).collect();
    Err(LintError {
        message: generate_error_message_for_files(
            TYPE_CHECK_HEADER,
            &remove_duplicate_file_names(&files),
        ),
    }
    .into())
}

/// One path per line under the header, first occurrence order.
pub fn generate_error_message_for_files(header: &str, files: &[PathBuf]) -> String {
    let mut message = String::from(header);
    for file in files {
        message.push('\n');
        message.push_str(&file.display().to_string());
    }
    message
}

pub fn remove_duplicate_file_names(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = FxHashSet::default();
    paths
        .iter()
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}
