//! Watch mode: filesystem events in, rebuilds out.
//!
//! Raw watcher events are debounced into one batch per editing burst, then
//! routed: a batch made only of modifications to tracked files takes the
//! incremental path, anything else (new files, deletions, a project config
//! edit) forces a full compile. A recoverable incremental failure also falls
//! back to the full path, so watch mode converges on a correct build even
//! when a single-file update cannot.
//!
//! After each successful rebuild the whole-program type check is handed to
//! the background worker; its verdict lands on the status line whenever it
//! arrives, without ever blocking the next rebuild.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, bounded, unbounded};
use crossbeam::select;
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::config::AnvilConfig;
use crate::core::{BuildContext, ChangeEvent, ChangedFile};
use crate::errors::BuildError;
use crate::logger::{status_error, status_success, status_warning};
use crate::services::Compiler;
use crate::store::Entry;
use crate::transpile::worker::{CheckRequest, WorkerManager, WorkerOutcome};
use crate::transpile::{TranspileOptions, TranspileSession};
use crate::{debug, log};

/// Window within which watcher events coalesce into one rebuild.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Run watch mode until interrupted.
pub fn watch<C: Compiler>(
    config: &AnvilConfig,
    session: &mut TranspileSession<C>,
    ctx: &BuildContext,
    worker: Option<Arc<WorkerManager>>,
) -> anyhow::Result<()> {
    let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        event_tx.send(res).ok();
    })?;
    watcher.watch(&config.src_dir(), RecursiveMode::Recursive)?;
    // Project config edits invalidate the session caches, so watch it too.
    let tsconfig = config.tsconfig_path();
    if tsconfig.is_file() {
        watcher.watch(&tsconfig, RecursiveMode::NonRecursive)?;
    }

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        stop_tx.send(()).ok();
    })?;

    log!("watch"; "watching {}", config.src_dir().display());

    loop {
        select! {
            recv(stop_rx) -> _ => {
                log!("watch"; "shutting down");
                return Ok(());
            }
            recv(event_rx) -> event => {
                let Ok(event) = event else { return Ok(()) };
                let mut changes = classify(event, config);
                changes.extend(drain_window(&event_rx, config));
                let changes = dedupe_changes(changes);
                if changes.is_empty() {
                    continue;
                }
                rebuild(config, session, ctx, worker.as_ref(), &changes);
            }
        }
    }
}

/// Collect every event arriving inside the debounce window.
fn drain_window(rx: &Receiver<notify::Result<Event>>, config: &AnvilConfig) -> Vec<ChangedFile> {
    let mut changes = Vec::new();
    let deadline = Instant::now() + DEBOUNCE;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) {
        match rx.recv_timeout(remaining) {
            Ok(event) => changes.extend(classify(event, config)),
            Err(_) => break,
        }
    }
    changes
}

/// Map one raw watcher event onto tracked-file change descriptors.
fn classify(event: notify::Result<Event>, config: &AnvilConfig) -> Vec<ChangedFile> {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            debug!("watch"; "watcher error: {e}");
            return Vec::new();
        }
    };

    let change = match event.kind {
        EventKind::Create(_) => ChangeEvent::Create,
        EventKind::Modify(_) => ChangeEvent::Change,
        EventKind::Remove(_) => ChangeEvent::Delete,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .filter(|path| is_watched_path(path, config))
        .map(|path| ChangedFile::new(change, path))
        .collect()
}

fn is_watched_path(path: &Path, config: &AnvilConfig) -> bool {
    if path == config.tsconfig_path() {
        return true;
    }
    if path.starts_with(config.build_dir()) {
        return false;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "html")
    )
}

/// Last event per path wins within a batch.
fn dedupe_changes(changes: Vec<ChangedFile>) -> Vec<ChangedFile> {
    let mut deduped: Vec<ChangedFile> = Vec::new();
    for change in changes {
        deduped.retain(|existing| existing.path != change.path);
        deduped.push(change);
    }
    deduped
}

fn rebuild<C: Compiler>(
    config: &AnvilConfig,
    session: &mut TranspileSession<C>,
    ctx: &BuildContext,
    worker: Option<&Arc<WorkerManager>>,
    changes: &[ChangedFile],
) {
    for change in changes {
        log!("watch"; "{} {}", change.path.display(), change.event.label());
    }

    // Eligibility is judged against the store as it was before this batch.
    let incremental = changes
        .iter()
        .all(|c| crate::transpile::update::can_run_update(c.event, &c.path, &ctx.store));

    // A config edit or a file-set change invalidates the session caches; the
    // file list is derived from the project config's include globs.
    let config_changed = changes.iter().any(|c| c.path == config.tsconfig_path());
    let file_set_changed = changes.iter().any(|c| c.event != ChangeEvent::Change);
    if config_changed || file_set_changed {
        session.invalidate();
    }

    refresh_store(ctx, changes);

    let opts = TranspileOptions::from_config(config);
    let started = Instant::now();

    let result = if incremental && !config_changed {
        let updates = update_targets(ctx, changes);
        match crate::transpile::update::transpile_update(session, ctx, config, &updates, &opts) {
            Err(e) if e.is_recoverable() => {
                debug!("watch"; "incremental update failed ({e}), running full build");
                session.transpile(ctx, config, &opts)
            }
            other => other,
        }
    } else {
        session.transpile(ctx, config, &opts)
    };

    match result {
        Ok(()) => {
            status_success(&format!(
                "rebuilt in {} ms",
                started.elapsed().as_millis()
            ));
            if let Some(worker) = worker {
                kick_type_check(config, worker);
            }
        }
        Err(e) => report_failure(&e),
    }
}

/// Sync the store with what just happened on disk. Only tracked sources are
/// stored; a config edit reaches the next compile through the reparse, not
/// the store.
fn refresh_store(ctx: &BuildContext, changes: &[ChangedFile]) {
    for change in changes {
        if change.ext != ".ts" && change.ext != ".html" {
            continue;
        }
        match change.event {
            ChangeEvent::Delete => {
                ctx.store.delete(&change.path);
            }
            ChangeEvent::Create | ChangeEvent::Change => {
                if let Ok(content) = std::fs::read_to_string(&change.path) {
                    ctx.store.set(&change.path, Entry::new(&change.path, content));
                }
            }
        }
    }
}

/// Incremental compile targets for a batch: each changed script compiles
/// itself; a changed template recompiles its companion script so the inlined
/// copy stays current.
fn update_targets(ctx: &BuildContext, changes: &[ChangedFile]) -> Vec<ChangedFile> {
    let mut targets = Vec::new();
    for change in changes {
        match change.ext.as_str() {
            ".ts" => targets.push(change.clone()),
            ".html" => {
                let companion = change.path.with_extension("ts");
                if ctx.store.has(&companion) {
                    targets.push(ChangedFile::new(ChangeEvent::Change, companion));
                }
            }
            _ => {}
        }
    }
    dedupe_changes(targets)
}

fn report_failure(error: &BuildError) {
    status_error("build failed", &error.to_string());
}

/// Hand the whole-program check to the worker off-thread; the rebuild loop
/// never waits on it.
fn kick_type_check(config: &AnvilConfig, worker: &Arc<WorkerManager>) {
    let worker = Arc::clone(worker);
    let request = CheckRequest {
        root_dir: config.root.clone(),
        build_dir: config.build_dir(),
        config_file: config.tsconfig_path(),
    };
    std::thread::spawn(move || match worker.check(&request) {
        Ok(WorkerOutcome::Clean) => debug!("worker"; "type check clean"),
        Ok(WorkerOutcome::Failed(count)) => {
            status_warning(&format!("type check found {count} problem(s)"));
        }
        Ok(WorkerOutcome::Crashed) => log!("worker"; "type check worker died, will respawn"),
        Err(e) => log!("worker"; "type check unavailable: {e}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_in(dir: &tempfile::TempDir) -> AnvilConfig {
        std::fs::write(dir.path().join("anvil.toml"), "").unwrap();
        AnvilConfig::load(&dir.path().join("anvil.toml")).unwrap()
    }

    #[test]
    fn classify_keeps_tracked_extensions_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let src = config.src_dir();

        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(src.join("home.page.ts"))
            .add_path(src.join("home.html"))
            .add_path(src.join("readme.md"));

        let changes = classify(Ok(event), &config);
        let exts: Vec<&str> = changes.iter().map(|c| c.ext.as_str()).collect();
        assert_eq!(exts, vec![".ts", ".html"]);
        assert!(changes.iter().all(|c| c.event == ChangeEvent::Change));
    }

    #[test]
    fn classify_ignores_build_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        let event = Event::new(EventKind::Create(notify::event::CreateKind::Any))
            .add_path(config.build_dir().join("main.ts"));
        assert!(classify(Ok(event), &config).is_empty());
    }

    #[test]
    fn last_event_per_path_wins() {
        let path = PathBuf::from("/app/src/a.ts");
        let changes = dedupe_changes(vec![
            ChangedFile::new(ChangeEvent::Create, &path),
            ChangedFile::new(ChangeEvent::Change, &path),
            ChangedFile::new(ChangeEvent::Change, "/app/src/b.ts"),
        ]);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, path);
        assert_eq!(changes[0].event, ChangeEvent::Change);
    }

    #[test]
    fn template_change_targets_companion_script() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let ctx = BuildContext::new(dir.path(), config.build_dir());

        let ts = config.src_dir().join("home.page.ts");
        let html = config.src_dir().join("home.page.html");
        ctx.store.set(&ts, Entry::new(&ts, "export class HomePage {}"));
        ctx.store.set(&html, Entry::new(&html, "<p></p>"));

        let targets =
            update_targets(&ctx, &[ChangedFile::new(ChangeEvent::Change, &html)]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path, ts);

        // both the template and its script changing still compiles once
        let targets = update_targets(
            &ctx,
            &[
                ChangedFile::new(ChangeEvent::Change, &html),
                ChangedFile::new(ChangeEvent::Change, &ts),
            ],
        );
        assert_eq!(targets.len(), 1);
    }
}
