//! Diagnostics normalization.
//!
//! Compiler and linter findings arrive in different shapes; everything the
//! user sees goes through the single [`Diagnostic`] record here and the one
//! renderer in [`print`]. Each diagnostic carries the offending source lines
//! plus up to one line of context either side, clipped at file bounds.

pub mod print;

use std::path::{Path, PathBuf};

use crate::services::{CompilerDiagnostic, DiagnosticCategory, LintFileResult, LintMessage};

/// Characters that terminate an error span on its primary line.
pub const STOP_CHARS: &[char] = &[
    ' ', '\t', '=', ',', '.', ';', ':', '{', '}', '(', ')', '[', ']', '"', '\'', '`', '?', '+',
    '-', '*', '/', '<', '>', '&', '|', '!',
];

/// Sentinel for pure-context lines (no error span).
pub const NO_SPAN: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Off,
    Warn,
    Error,
}

/// Which check produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSource {
    Compiler,
    Linter,
}

impl DiagnosticSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Compiler => "typescript",
            Self::Linter => "eslint",
        }
    }
}

/// One line of source listed with a diagnostic.
///
/// `error_start`/`error_length` are `-1/-1` for pure-context lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    pub line_index: usize,
    pub text: String,
    pub error_start: i32,
    pub error_length: i32,
}

/// The normalized record representing one compile or lint finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: DiagnosticSource,
    pub abs_path: PathBuf,
    pub rel_path: PathBuf,
    pub header: String,
    pub code: String,
    pub message: String,
    pub lines: Vec<ContextLine>,
}

/// Split source into lines, tolerating `\r\n`.
pub fn split_line_breaks(source: &str) -> Vec<&str> {
    source.split('\n').map(|l| l.trim_end_matches('\r')).collect()
}

fn format_header(source: DiagnosticSource, rel_path: &Path, line: usize) -> String {
    format!("{}: {}, line: {}", source.label(), rel_path.display(), line + 1)
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

/// Normalize one compiler diagnostic.
pub fn normalize_compiler(root: &Path, raw: &CompilerDiagnostic) -> Diagnostic {
    let severity = match raw.category {
        DiagnosticCategory::Error => Severity::Error,
        DiagnosticCategory::Warning => Severity::Warn,
        DiagnosticCategory::Message => Severity::Off,
    };

    let abs_path = raw.file.clone().unwrap_or_default();
    let rel_path = relative_to(root, &abs_path);

    let lines = raw
        .source_text
        .as_deref()
        .map(|src| slice_context(src, raw.line, raw.column, raw.line, raw.column))
        .unwrap_or_default();

    Diagnostic {
        severity,
        source: DiagnosticSource::Compiler,
        header: format_header(DiagnosticSource::Compiler, &rel_path, raw.line),
        abs_path,
        rel_path,
        code: format!("TS{}", raw.code),
        message: raw.message.clone(),
        lines,
    }
}

/// Normalize every message of one lint result.
pub fn normalize_lint(root: &Path, result: &LintFileResult) -> Vec<Diagnostic> {
    result
        .messages
        .iter()
        .map(|message| lint_message_to_diagnostic(root, result, message))
        .collect()
}

fn lint_message_to_diagnostic(
    root: &Path,
    result: &LintFileResult,
    message: &LintMessage,
) -> Diagnostic {
    // Linter severities: 0 = off, 1 = warn, 2 = error.
    let severity = match message.severity {
        0 => Severity::Off,
        1 => Severity::Warn,
        _ => Severity::Error,
    };

    // Linter positions are 1-based.
    let start_line = message.line.saturating_sub(1);
    let end_line = message.end_line.unwrap_or(message.line).saturating_sub(1);
    let start_col = message.column.saturating_sub(1);
    let end_col = message.end_column.unwrap_or(message.column).saturating_sub(1);

    let rel_path = relative_to(root, &result.file_path);
    let lines = result
        .source
        .as_deref()
        .map(|src| slice_context(src, start_line, start_col, end_line, end_col))
        .unwrap_or_default();

    Diagnostic {
        severity,
        source: DiagnosticSource::Linter,
        header: format_header(DiagnosticSource::Linter, &rel_path, start_line),
        abs_path: result.file_path.clone(),
        rel_path,
        code: message.rule_id.clone().unwrap_or_default(),
        message: message.message.clone(),
        lines,
    }
}

/// Build the context-line listing for a span.
///
/// Includes every non-blank line the span covers, plus one leading and one
/// trailing context line when within file bounds. The error span on a primary
/// line runs from the reported column to the first stop character; a computed
/// zero-width span with a nonzero start is backed up one column and given
/// length one so the marker stays visible.
pub fn slice_context(
    source: &str,
    start_line: usize,
    start_col: usize,
    end_line: usize,
    end_col: usize,
) -> Vec<ContextLine> {
    let src_lines = split_line_breaks(source);
    if src_lines.is_empty() || start_line >= src_lines.len() {
        return Vec::new();
    }
    let end_line = end_line.min(src_lines.len() - 1);

    let mut lines = Vec::new();

    for index in start_line..=end_line {
        let text = src_lines[index];
        if text.trim().is_empty() {
            continue;
        }

        let span_start = if index == start_line {
            start_col
        } else if index == end_line {
            end_col
        } else {
            0
        };

        let chars: Vec<char> = text.chars().collect();
        let mut length = 0usize;
        for ch in chars.iter().skip(span_start) {
            if STOP_CHARS.contains(ch) {
                break;
            }
            length += 1;
        }

        let (mut error_start, mut error_length) = (span_start as i32, length as i32);
        if error_length == 0 && error_start > 0 {
            error_start -= 1;
            error_length = 1;
        }

        lines.push(ContextLine {
            line_index: index,
            text: text.to_string(),
            error_start,
            error_length,
        });
    }

    if start_line > 0 {
        lines.insert(
            0,
            ContextLine {
                line_index: start_line - 1,
                text: src_lines[start_line - 1].to_string(),
                error_start: NO_SPAN,
                error_length: NO_SPAN,
            },
        );
    }

    if end_line + 1 < src_lines.len() {
        lines.push(ContextLine {
            line_index: end_line + 1,
            text: src_lines[end_line + 1].to_string(),
            error_start: NO_SPAN,
            error_length: NO_SPAN,
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_runs_to_first_stop_char() {
        let src = "const first = 1;\nconst answer = wrong;\nconst last = 3;";
        let lines = slice_context(src, 1, 15, 1, 15);

        // context before, primary, context after
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].error_start, NO_SPAN);
        assert_eq!(lines[1].line_index, 1);
        assert_eq!(lines[1].error_start, 15);
        assert_eq!(lines[1].error_length, "wrong".len() as i32);
        assert_eq!(lines[2].error_start, NO_SPAN);
    }

    #[test]
    fn zero_width_span_backs_up_one_column() {
        // Column 10 points at '=', a stop char, so the computed length is zero.
        let src = "let value = 1;";
        let lines = slice_context(src, 0, 10, 0, 10);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].error_start, 9);
        assert_eq!(lines[0].error_length, 1);
    }

    #[test]
    fn context_clipped_at_file_bounds() {
        let src = "only line";
        let lines = slice_context(src, 0, 0, 0, 0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line_index, 0);
    }

    #[test]
    fn blank_primary_lines_are_skipped() {
        let src = "first\n\nthird";
        let lines = slice_context(src, 0, 0, 2, 0);
        // line 1 is blank: dropped from the primary set
        let indexes: Vec<_> = lines.iter().map(|l| l.line_index).collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    #[test]
    fn lint_severity_mapping() {
        use crate::services::{LintFileResult, LintMessage};

        let result = LintFileResult {
            file_path: PathBuf::from("/app/src/a.ts"),
            error_count: 1,
            warning_count: 1,
            messages: vec![
                LintMessage { line: 1, column: 1, end_line: None, end_column: None, severity: 0, rule_id: None, message: "m".into() },
                LintMessage { line: 1, column: 1, end_line: None, end_column: None, severity: 1, rule_id: None, message: "m".into() },
                LintMessage { line: 1, column: 1, end_line: None, end_column: None, severity: 2, rule_id: Some("eqeqeq".into()), message: "m".into() },
            ],
            source: Some("let x == 1;".into()),
        };

        let diags = normalize_lint(Path::new("/app"), &result);
        assert_eq!(diags[0].severity, Severity::Off);
        assert_eq!(diags[1].severity, Severity::Warn);
        assert_eq!(diags[2].severity, Severity::Error);
        assert_eq!(diags[2].code, "eqeqeq");
        assert_eq!(diags[2].rel_path, PathBuf::from("src/a.ts"));
    }

    #[test]
    fn split_tolerates_crlf() {
        assert_eq!(split_line_breaks("a\r\nb\nc"), vec!["a", "b", "c"]);
    }
}
