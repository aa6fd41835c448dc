//! Process-backed compiler/linter bridge.
//!
//! Spawns one long-lived helper process (typically a small node script
//! wrapping the TypeScript compiler API and the linter) and talks
//! line-delimited JSON over its stdio. The child keeps compiled programs
//! alive between requests and hands back numeric handles, which is what
//! makes the full-program reuse hint cheap.
//!
//! A broken pipe or malformed reply discards the child; the next request
//! spawns a fresh one.

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::{
    Compiler, CompilerDiagnostic, EmittedFile, LintFileResult, Linter, ProgramOutput,
    TranspileOutput,
};
use crate::config::project::CompilerOptions;
use crate::store::FileStore;

/// Opaque program handle: an id the bridge child retains.
#[derive(Debug, Clone, Copy)]
pub struct BridgeProgram(u64);

pub struct Bridge {
    /// Command line for the helper, e.g. `["node", "anvil-bridge.js"]`.
    command: Vec<String>,
    root: PathBuf,
    child: Mutex<Option<BridgeChild>>,
}

struct BridgeChild {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Bridge {
    pub fn new(command: Vec<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            command,
            root: root.into(),
            child: Mutex::new(None),
        }
    }

    fn spawn(&self) -> Result<BridgeChild> {
        let (program, args) = self
            .command
            .split_first()
            .context("bridge command is empty")?;

        let mut process = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn bridge `{program}`"))?;

        let stdin = process.stdin.take().context("bridge stdin unavailable")?;
        let stdout = process.stdout.take().context("bridge stdout unavailable")?;

        crate::debug!("bridge"; "spawned `{program}`, pid {}", process.id());

        Ok(BridgeChild {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// One request/reply round-trip. The child is discarded on any failure so
    /// the next request starts clean.
    fn request<R: DeserializeOwned>(&self, request: &BridgeRequest) -> Result<R> {
        let mut slot = self.child.lock();
        if slot.is_none() {
            *slot = Some(self.spawn()?);
        }
        let child = slot.as_mut().context("bridge child missing")?;

        let round_trip = (|| -> Result<R> {
            let mut line = serde_json::to_string(request)?;
            line.push('\n');
            child.stdin.write_all(line.as_bytes())?;
            child.stdin.flush()?;

            let mut reply = String::new();
            let read = child.stdout.read_line(&mut reply)?;
            if read == 0 {
                bail!("bridge closed its stdout");
            }

            let envelope: Envelope<R> = serde_json::from_str(reply.trim_end())
                .context("malformed bridge reply")?;
            match envelope {
                Envelope {
                    error: Some(message),
                    ..
                } => bail!("bridge error: {message}"),
                Envelope { payload, .. } => payload.context("bridge reply missing payload"),
            }
        })();

        if round_trip.is_err() {
            if let Some(mut dead) = slot.take() {
                dead.process.kill().ok();
                dead.process.wait().ok();
            }
        }
        round_trip
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take() {
            child.process.kill().ok();
            child.process.wait().ok();
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum BridgeRequest {
    #[serde(rename_all = "camelCase")]
    Compile {
        files: Vec<PathBuf>,
        options: OptionsWire,
        sources: Vec<SourceWire>,
        prior: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Transpile {
        file_name: PathBuf,
        source: String,
        options: OptionsWire,
    },
    #[serde(rename_all = "camelCase")]
    Check { program: u64 },
    #[serde(rename_all = "camelCase")]
    Lint { paths: Vec<PathBuf> },
    #[serde(rename_all = "camelCase")]
    Format {
        format: String,
        results: Vec<LintFileResult>,
    },
}

/// Snapshot of the shared options at request time.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptionsWire {
    target: String,
    module: String,
    out_dir: Option<PathBuf>,
    strict: bool,
    allow_js: bool,
    experimental_decorators: bool,
    source_map: bool,
    declaration: bool,
}

impl OptionsWire {
    fn from(options: &CompilerOptions) -> Self {
        Self {
            target: options.target.clone(),
            module: options.module.clone(),
            out_dir: options.out_dir.clone(),
            strict: options.strict,
            allow_js: options.allow_js,
            experimental_decorators: options.experimental_decorators,
            source_map: options.source_map(),
            declaration: options.declaration(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceWire {
    path: PathBuf,
    content: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompileReply {
    program: u64,
    emitted: Vec<EmittedFile>,
    diagnostics: Vec<CompilerDiagnostic>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranspileReply {
    output_text: String,
    #[serde(default)]
    source_map_text: String,
    diagnostics: Vec<CompilerDiagnostic>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckReply {
    diagnostics: Vec<CompilerDiagnostic>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LintReply {
    results: Vec<LintFileResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatReply {
    output: String,
}

// ============================================================================
// Trait impls
// ============================================================================

impl Compiler for Bridge {
    type Program = BridgeProgram;

    fn compile(
        &self,
        file_names: &[PathBuf],
        options: &CompilerOptions,
        store: &FileStore,
        prior: Option<&Self::Program>,
    ) -> Result<ProgramOutput<Self::Program>> {
        let sources = file_names
            .iter()
            .filter_map(|path| store.get(path))
            .map(|entry| SourceWire {
                path: entry.path,
                content: entry.content,
            })
            .collect();

        let reply: CompileReply = self.request(&BridgeRequest::Compile {
            files: file_names.to_vec(),
            options: OptionsWire::from(options),
            sources,
            prior: prior.map(|p| p.0),
        })?;

        Ok(ProgramOutput {
            program: BridgeProgram(reply.program),
            emitted: reply.emitted,
            diagnostics: reply.diagnostics,
        })
    }

    fn transpile_module(
        &self,
        path: &Path,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<TranspileOutput> {
        let reply: TranspileReply = self.request(&BridgeRequest::Transpile {
            file_name: path.to_path_buf(),
            source: source.to_string(),
            options: OptionsWire::from(options),
        })?;

        Ok(TranspileOutput {
            output_text: reply.output_text,
            source_map_text: reply.source_map_text,
            diagnostics: reply.diagnostics,
        })
    }

    fn pre_emit_diagnostics(
        &self,
        program: &Self::Program,
    ) -> Result<Vec<CompilerDiagnostic>> {
        let reply: CheckReply = self.request(&BridgeRequest::Check { program: program.0 })?;
        Ok(reply.diagnostics)
    }
}

impl Linter for Bridge {
    fn lint(&self, paths: &[PathBuf]) -> Result<Vec<LintFileResult>> {
        let reply: LintReply = self.request(&BridgeRequest::Lint {
            paths: paths.to_vec(),
        })?;
        Ok(reply.results)
    }

    fn format_report(&self, format: &str, results: &[LintFileResult]) -> Result<String> {
        let reply: FormatReply = self.request(&BridgeRequest::Format {
            format: format.to_string(),
            results: results.to_vec(),
        })?;
        Ok(reply.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_op_tag() {
        let request = BridgeRequest::Check { program: 7 };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"op":"check","program":7}"#);
    }

    #[test]
    fn envelope_error_wins_over_payload() {
        let envelope: Envelope<CheckReply> =
            serde_json::from_str(r#"{"error":"no such program"}"#).unwrap();
        assert_eq!(envelope.error.as_deref(), Some("no such program"));
    }

    // `cat` echoes our request back, which is not a valid reply envelope for
    // CheckReply; the round-trip must fail cleanly and discard the child.
    #[test]
    fn malformed_reply_discards_child() {
        let bridge = Bridge::new(vec!["cat".into()], std::env::temp_dir());
        let result: Result<CheckReply> = bridge.request(&BridgeRequest::Check { program: 1 });
        assert!(result.is_err());
        assert!(bridge.child.lock().is_none());
    }
}
