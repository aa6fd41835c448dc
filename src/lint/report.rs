//! Lint report writer.
//!
//! Renders lint results through the linter's named formatter and delivers
//! them to `lint.output_file` or, absent that, the log stream. Report
//! delivery never fails the build; a report that cannot be written is logged
//! and dropped.

use crate::config::AnvilConfig;
use crate::log;
use crate::services::{LintFileResult, Linter};

pub fn write_report<L: Linter>(config: &AnvilConfig, linter: &L, results: &[LintFileResult]) {
    let rendered = match linter.format_report(&config.lint.format, results) {
        Ok(rendered) => rendered,
        Err(e) => {
            log!("lint"; "could not render lint report: {e:#}");
            return;
        }
    };

    let Some(output_file) = &config.lint.output_file else {
        if !rendered.trim().is_empty() {
            log!("lint"; "{rendered}");
        }
        return;
    };

    let path = config.root.join(output_file);
    if path.is_dir() {
        log!("lint"; "report path `{}` is a directory, skipping report", path.display());
        return;
    }
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log!("lint"; "could not create report directory `{}`: {e}", parent.display());
            return;
        }
    }

    match std::fs::write(&path, rendered) {
        Ok(()) => log!("lint"; "report written to {}", path.display()),
        Err(e) => log!("lint"; "could not write report to `{}`: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeLinter;
    use std::path::PathBuf;

    fn config_with_output(dir: &tempfile::TempDir, output: &str) -> AnvilConfig {
        let toml = format!("[lint]\noutput_file = \"{output}\"\n");
        std::fs::write(dir.path().join("anvil.toml"), toml).unwrap();
        AnvilConfig::load(&dir.path().join("anvil.toml")).unwrap()
    }

    fn one_result(path: &str) -> LintFileResult {
        LintFileResult {
            file_path: PathBuf::from(path),
            error_count: 2,
            warning_count: 0,
            messages: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn report_written_with_parent_dirs_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_output(&dir, "reports/lint.txt");

        write_report(&config, &FakeLinter::default(), &[one_result("src/a.ts")]);

        let written = std::fs::read_to_string(dir.path().join("reports/lint.txt")).unwrap();
        assert_eq!(written, "src/a.ts: 2 errors");
    }

    #[test]
    fn directory_target_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("reports")).unwrap();
        let config = config_with_output(&dir, "reports");

        // must not panic or replace the directory
        write_report(&config, &FakeLinter::default(), &[one_result("src/a.ts")]);
        assert!(dir.path().join("reports").is_dir());
    }
}
