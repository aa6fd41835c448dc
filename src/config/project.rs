//! Project (tsconfig-style) configuration.
//!
//! Parsed once per build context and cached by the transpile session; every
//! consumer shares the same [`ParsedConfig`], so the emission toggles are
//! atomics - flipping `source_map` for one call is visible to all sharers
//! without a reparse.
//!
//! Real-world tsconfig files carry comments and trailing commas, so the file
//! is parsed as JSON5.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ConfigDiagnostics, ConfigError};

/// Compiler option keys this loader understands. Anything else in
/// `compilerOptions` is an invalid-option error.
const KNOWN_OPTIONS: &[&str] = &[
    "target",
    "module",
    "outDir",
    "sourceMap",
    "declaration",
    "allowJs",
    "strict",
    "experimentalDecorators",
    "emitDecoratorMetadata",
    "moduleResolution",
    "lib",
    "types",
    "baseUrl",
    "paths",
    "skipLibCheck",
    "noImplicitAny",
];

/// Validated compiler options.
///
/// `source_map` and `declaration` are toggled per call by the compile
/// engines; everything else is fixed at parse time.
#[derive(Debug)]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub out_dir: Option<PathBuf>,
    pub strict: bool,
    pub allow_js: bool,
    pub experimental_decorators: bool,
    source_map: AtomicBool,
    declaration: AtomicBool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "es5".into(),
            module: "es2015".into(),
            out_dir: None,
            strict: false,
            allow_js: false,
            experimental_decorators: false,
            source_map: AtomicBool::new(false),
            declaration: AtomicBool::new(false),
        }
    }
}

impl CompilerOptions {
    pub fn source_map(&self) -> bool {
        self.source_map.load(Ordering::SeqCst)
    }

    /// Visible to every consumer sharing the cached config.
    pub fn set_source_map(&self, enabled: bool) {
        self.source_map.store(enabled, Ordering::SeqCst);
    }

    pub fn declaration(&self) -> bool {
        self.declaration.load(Ordering::SeqCst)
    }

    /// Dev builds force declaration emission off.
    pub fn set_declaration(&self, enabled: bool) {
        self.declaration.store(enabled, Ordering::SeqCst);
    }
}

/// Parsed project configuration: validated options plus the resolved absolute
/// file list. Callers may cache this indefinitely; it is shared, never
/// deep-copied.
#[derive(Debug)]
pub struct ParsedConfig {
    pub options: CompilerOptions,
    pub file_names: Vec<PathBuf>,
    pub raw: Value,
}

/// Read, parse, and validate the project config file.
///
/// Fails with [`ConfigError`] when the file is unreadable, malformed, or
/// contains invalid options - every invalid field is aggregated into one
/// message.
pub fn load_project_config(config_file: &Path, root: &Path) -> Result<ParsedConfig, ConfigError> {
    let text = std::fs::read_to_string(config_file)
        .map_err(|e| ConfigError::Io(config_file.to_path_buf(), e))?;

    let raw: Value = json5::from_str(&text).map_err(|e| ConfigError::Malformed {
        path: config_file.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !raw.is_object() {
        return Err(ConfigError::Malformed {
            path: config_file.to_path_buf(),
            reason: "top level must be an object".into(),
        });
    }

    let mut diagnostics = ConfigDiagnostics::new();
    let options = parse_compiler_options(&raw, &mut diagnostics);
    let file_names = resolve_file_names(&raw, root, &mut diagnostics);
    diagnostics.into_result()?;

    Ok(ParsedConfig {
        options,
        file_names,
        raw,
    })
}

fn parse_compiler_options(raw: &Value, diagnostics: &mut ConfigDiagnostics) -> CompilerOptions {
    let options = CompilerOptions::default();
    let Some(section) = raw.get("compilerOptions") else {
        return options;
    };
    let Some(map) = section.as_object() else {
        diagnostics.error("compilerOptions", "must be an object");
        return options;
    };

    let mut parsed = CompilerOptions::default();
    for (key, value) in map {
        if !KNOWN_OPTIONS.contains(&key.as_str()) {
            diagnostics.error(
                format!("compilerOptions.{key}"),
                "unknown compiler option",
            );
            continue;
        }
        match key.as_str() {
            "target" => match value.as_str() {
                Some(v) => parsed.target = v.to_string(),
                None => diagnostics.error("compilerOptions.target", "expected a string"),
            },
            "module" => match value.as_str() {
                Some(v) => parsed.module = v.to_string(),
                None => diagnostics.error("compilerOptions.module", "expected a string"),
            },
            "outDir" => match value.as_str() {
                Some(v) => parsed.out_dir = Some(PathBuf::from(v)),
                None => diagnostics.error("compilerOptions.outDir", "expected a string"),
            },
            "sourceMap" => match value.as_bool() {
                Some(v) => parsed.source_map = AtomicBool::new(v),
                None => diagnostics.error("compilerOptions.sourceMap", "expected a boolean"),
            },
            "declaration" => match value.as_bool() {
                Some(v) => parsed.declaration = AtomicBool::new(v),
                None => diagnostics.error("compilerOptions.declaration", "expected a boolean"),
            },
            "allowJs" => match value.as_bool() {
                Some(v) => parsed.allow_js = v,
                None => diagnostics.error("compilerOptions.allowJs", "expected a boolean"),
            },
            "strict" => match value.as_bool() {
                Some(v) => parsed.strict = v,
                None => diagnostics.error("compilerOptions.strict", "expected a boolean"),
            },
            "experimentalDecorators" => match value.as_bool() {
                Some(v) => parsed.experimental_decorators = v,
                None => diagnostics.error(
                    "compilerOptions.experimentalDecorators",
                    "expected a boolean",
                ),
            },
            // Accepted but not interpreted by this orchestrator; the compiler
            // service reads them from `raw`.
            _ => {}
        }
    }
    parsed
}

/// Resolve the absolute file list from `files` / `include`, defaulting to
/// every `.ts` under `src/`.
fn resolve_file_names(
    raw: &Value,
    root: &Path,
    diagnostics: &mut ConfigDiagnostics,
) -> Vec<PathBuf> {
    let mut names: Vec<PathBuf> = Vec::new();

    if let Some(files) = raw.get("files") {
        match files.as_array() {
            Some(list) => {
                for file in list {
                    match file.as_str() {
                        Some(f) => names.push(root.join(f)),
                        None => diagnostics.error("files", "entries must be strings"),
                    }
                }
            }
            None => diagnostics.error("files", "expected an array"),
        }
    }

    let patterns: Vec<String> = match raw.get("include") {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|p| p.as_str().map(str::to_string))
            .collect(),
        Some(_) => {
            diagnostics.error("include", "expected an array of glob patterns");
            Vec::new()
        }
        None if names.is_empty() => vec!["src/**/*.ts".into()],
        None => Vec::new(),
    };

    for pattern in patterns {
        let rooted = root.join(&pattern);
        match glob::glob(&rooted.to_string_lossy()) {
            Ok(matches) => {
                for path in matches.flatten() {
                    if path.extension().is_some_and(|e| e == "ts") {
                        names.push(path);
                    }
                }
            }
            Err(e) => diagnostics.error("include", format!("bad pattern `{pattern}`: {e}")),
        }
    }

    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_project(dir: &Path, tsconfig: &str) -> PathBuf {
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.ts"), "export {};").unwrap();
        fs::write(src.join("home.page.ts"), "export {};").unwrap();
        let path = dir.join("tsconfig.json");
        fs::write(&path, tsconfig).unwrap();
        path
    }

    #[test]
    fn parses_options_and_resolves_default_includes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_project(
            dir.path(),
            r#"{
              // dev build config
              compilerOptions: { target: "es2017", sourceMap: true, strict: true },
            }"#,
        );

        let config = load_project_config(&path, dir.path()).unwrap();
        assert_eq!(config.options.target, "es2017");
        assert!(config.options.source_map());
        assert!(config.options.strict);
        assert_eq!(config.file_names.len(), 2);
        assert!(config.raw.get("compilerOptions").is_some());
    }

    #[test]
    fn invalid_options_aggregate_into_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_project(
            dir.path(),
            r#"{ compilerOptions: { target: 5, sourceMap: "yes", bogusFlag: true } }"#,
        );

        let err = load_project_config(&path, dir.path()).unwrap_err();
        let ConfigError::Invalid(diagnostics) = err else {
            panic!("expected aggregated error");
        };
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsconfig.json");
        fs::write(&path, "{ compilerOptions: ").unwrap();

        let err = load_project_config(&path, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn source_map_toggle_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_project(dir.path(), "{}");
        let config = std::sync::Arc::new(load_project_config(&path, dir.path()).unwrap());

        let sharer = std::sync::Arc::clone(&config);
        config.options.set_source_map(true);
        assert!(sharer.options.source_map());
    }
}
