//! Detached diagnostics worker.
//!
//! Whole-project type checking is slow; the watch loop hands it to a
//! long-lived child process so rebuilds never wait on it. At most one worker
//! is alive, spawned lazily and reused. The request mutex is held for the
//! whole round-trip, making the protocol single-slot: a second caller blocks
//! until the first completion fires, so requests can never race on the
//! completion signal.
//!
//! The completion signal carries an explicit [`WorkerOutcome`]: a clean
//! check, a check that found problems, and a worker that died before
//! replying are three distinguishable results.

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::config::AnvilConfig;
use crate::core::BuildContext;
use crate::diagnostics::print::print_diagnostics;
use crate::diagnostics::{Diagnostic, normalize_compiler};
use crate::errors::WorkerError;
use crate::services::Compiler;
use crate::services::bridge::Bridge;

/// Outbound request: everything the worker needs to run one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub root_dir: PathBuf,
    pub build_dir: PathBuf,
    pub config_file: PathBuf,
}

/// Inbound reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReply {
    pub success: bool,
    pub diagnostics: usize,
}

/// How one request finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Check ran and found nothing.
    Clean,
    /// Check ran and found this many diagnostics.
    Failed(usize),
    /// Worker died before replying.
    Crashed,
}

struct WorkerHandle {
    child: Child,
    stdin: ChildStdin,
    outcomes: Receiver<WorkerOutcome>,
}

/// Manages the single background worker process.
pub struct WorkerManager {
    /// Command line for the worker, e.g. `[current_exe, "worker"]`.
    command: Vec<String>,
    /// Held for the full round-trip: the single-slot queue.
    slot: Mutex<Option<WorkerHandle>>,
}

impl WorkerManager {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            slot: Mutex::new(None),
        }
    }

    /// Manager that re-invokes this binary's hidden `worker` subcommand.
    pub fn for_current_exe() -> Result<Self, WorkerError> {
        let exe = std::env::current_exe().map_err(WorkerError::Spawn)?;
        Ok(Self::new(vec![
            exe.to_string_lossy().into_owned(),
            "worker".into(),
        ]))
    }

    /// Run one type-check request to completion.
    ///
    /// Blocks while another request is in flight. A crashed worker is
    /// discarded so the next request starts a fresh process.
    pub fn check(&self, request: &CheckRequest) -> Result<WorkerOutcome, WorkerError> {
        let mut slot = self.slot.lock();

        if slot.is_none() {
            *slot = Some(self.spawn()?);
        }
        let handle = slot.as_mut().expect("worker handle just ensured");

        let outcome = match send_request(handle, request) {
            Ok(()) => handle.outcomes.recv().unwrap_or(WorkerOutcome::Crashed),
            Err(e) => {
                crate::debug!("worker"; "send failed: {e}");
                WorkerOutcome::Crashed
            }
        };

        if outcome == WorkerOutcome::Crashed {
            if let Some(mut dead) = slot.take() {
                dead.child.kill().ok();
                dead.child.wait().ok();
            }
        }

        Ok(outcome)
    }

    /// Pid of the live worker, if one is running.
    pub fn live_worker_pid(&self) -> Option<u32> {
        self.slot.lock().as_ref().map(|h| h.child.id())
    }

    fn spawn(&self) -> Result<WorkerHandle, WorkerError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| WorkerError::Spawn(std::io::Error::other("empty worker command")))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn(std::io::Error::other("worker stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn(std::io::Error::other("worker stdout unavailable")))?;

        crate::debug!("worker"; "spawned, pid {}", child.id());

        let (tx, rx) = unbounded();
        std::thread::spawn(move || read_outcomes(stdout, &tx));

        Ok(WorkerHandle {
            child,
            stdin,
            outcomes: rx,
        })
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        if let Some(mut handle) = self.slot.lock().take() {
            handle.child.kill().ok();
            handle.child.wait().ok();
        }
    }
}

fn send_request(handle: &mut WorkerHandle, request: &CheckRequest) -> std::io::Result<()> {
    let mut line = serde_json::to_string(request).map_err(std::io::Error::other)?;
    line.push('\n');
    handle.stdin.write_all(line.as_bytes())?;
    handle.stdin.flush()
}

/// Reader side of the completion signal. Stray output lines are skipped;
/// EOF means the process died and becomes a final `Crashed`.
fn read_outcomes(stdout: std::process::ChildStdout, tx: &Sender<WorkerOutcome>) {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Ok(reply) = serde_json::from_str::<CheckReply>(&line) else {
            continue;
        };
        let outcome = if reply.success {
            WorkerOutcome::Clean
        } else {
            WorkerOutcome::Failed(reply.diagnostics)
        };
        if tx.send(outcome).is_err() {
            return;
        }
    }
    tx.send(WorkerOutcome::Crashed).ok();
}

// ============================================================================
// Worker process entry
// ============================================================================

/// Body of the hidden `worker` subcommand: serve type-check requests from
/// stdin until EOF. Replies go to stdout as JSON lines; diagnostics render
/// to stderr like any other pass.
pub fn run_worker_loop() -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: CheckRequest = serde_json::from_str(&line)?;

        let reply = match run_check(&request) {
            Ok(diagnostics) => {
                if !diagnostics.is_empty() {
                    print_diagnostics(&diagnostics);
                }
                CheckReply {
                    success: diagnostics.is_empty(),
                    diagnostics: diagnostics.len(),
                }
            }
            Err(e) => {
                eprintln!("worker check failed: {e:#}");
                CheckReply {
                    success: false,
                    diagnostics: 0,
                }
            }
        };

        let mut line = serde_json::to_string(&reply)?;
        line.push('\n');
        stdout.write_all(line.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}

/// One type-check-only pass over the whole project.
fn run_check(request: &CheckRequest) -> anyhow::Result<Vec<Diagnostic>> {
    let config = AnvilConfig::load(&request.root_dir.join("anvil.toml"))?;
    let parsed =
        crate::config::project::load_project_config(&request.config_file, &request.root_dir)?;

    let ctx = BuildContext::new(&request.root_dir, &request.build_dir);
    ctx.seed_from_disk(&config.src_dir())?;

    let bridge = Bridge::new(config.compiler.bridge.clone(), &request.root_dir);
    let output = bridge.compile(&parsed.file_names, &parsed.options, &ctx.store, None)?;

    let mut raw = output.diagnostics;
    raw.extend(bridge.pre_emit_diagnostics(&output.program)?);

    Ok(raw
        .iter()
        .map(|d| normalize_compiler(&request.root_dir, d))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shell worker that answers every request with a clean reply.
    fn echo_worker() -> WorkerManager {
        WorkerManager::new(vec![
            "sh".into(),
            "-c".into(),
            r#"while read line; do echo '{"success":true,"diagnostics":0}'; done"#.into(),
        ])
    }

    fn request() -> CheckRequest {
        CheckRequest {
            root_dir: PathBuf::from("/app"),
            build_dir: PathBuf::from("/app/www"),
            config_file: PathBuf::from("/app/tsconfig.json"),
        }
    }

    #[test]
    fn serialized_requests_reuse_one_process() {
        let manager = echo_worker();

        assert_eq!(manager.check(&request()).unwrap(), WorkerOutcome::Clean);
        let first_pid = manager.live_worker_pid().unwrap();

        assert_eq!(manager.check(&request()).unwrap(), WorkerOutcome::Clean);
        let second_pid = manager.live_worker_pid().unwrap();

        assert_eq!(first_pid, second_pid);
    }

    #[test]
    fn dead_worker_reports_crashed_and_is_discarded() {
        // Exits immediately: EOF before any reply.
        let manager = WorkerManager::new(vec!["true".into()]);

        assert_eq!(manager.check(&request()).unwrap(), WorkerOutcome::Crashed);
        assert!(manager.live_worker_pid().is_none());
    }

    #[test]
    fn failed_check_carries_diagnostic_count() {
        let manager = WorkerManager::new(vec![
            "sh".into(),
            "-c".into(),
            r#"while read line; do echo '{"success":false,"diagnostics":3}'; done"#.into(),
        ]);

        assert_eq!(
            manager.check(&request()).unwrap(),
            WorkerOutcome::Failed(3)
        );
    }

    #[test]
    fn reply_round_trips() {
        let reply = CheckReply {
            success: false,
            diagnostics: 2,
        };
        let json = serde_json::to_string(&reply).unwrap();
        let back: CheckReply = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert_eq!(back.diagnostics, 2);
    }
}
