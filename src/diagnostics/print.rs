//! The one renderer for normalized diagnostics.
//!
//! Diagnostics are always printed before the corresponding typed error is
//! raised, so the source listing precedes the failure message in terminal
//! output.

use owo_colors::OwoColorize;
use std::io::{Write, stderr};

use super::{Diagnostic, NO_SPAN, Severity};

/// Print a batch of diagnostics to stderr.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    let mut out = stderr().lock();
    for diagnostic in diagnostics {
        render(&mut out, diagnostic).ok();
    }
}

fn render(out: &mut impl Write, diagnostic: &Diagnostic) -> std::io::Result<()> {
    let severity = match diagnostic.severity {
        Severity::Error => "error".red().bold().to_string(),
        Severity::Warn => "warning".yellow().bold().to_string(),
        Severity::Off => "info".dimmed().to_string(),
    };

    writeln!(out, "\n{}", diagnostic.header.bold())?;
    if diagnostic.code.is_empty() {
        writeln!(out, "{severity}: {}", diagnostic.message)?;
    } else {
        writeln!(
            out,
            "{severity} {}: {}",
            diagnostic.code.dimmed(),
            diagnostic.message
        )?;
    }

    for line in &diagnostic.lines {
        let number = format!("{:>4}", line.line_index + 1);
        if line.error_start == NO_SPAN {
            writeln!(out, "{} {}", number.dimmed(), line.text.dimmed())?;
            continue;
        }

        writeln!(out, "{} {}", number.dimmed(), line.text)?;

        // Caret row under the error span
        let pad: String = line
            .text
            .chars()
            .take(line.error_start as usize)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        let carets = "^".repeat(line.error_length.max(1) as usize);
        writeln!(out, "     {}{}", pad, carets.red().bold())?;
    }

    Ok(())
}
