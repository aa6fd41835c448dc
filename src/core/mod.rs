//! Build context and file-change descriptors.
//!
//! One [`BuildContext`] exists per build invocation. It owns the virtual file
//! store, the compile-state flag, and the per-context recorded diagnostics.
//! A fresh run destroys and recreates the whole aggregate; nothing here
//! survives across contexts.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use parking_lot::Mutex;

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::store::{Entry, FileStore};

/// Compile state of the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Unbuilt,
    Building,
    Built,
}

/// What happened to a file (from the watcher or the caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Create,
    Change,
    Delete,
}

impl ChangeEvent {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Change => "changed",
            Self::Delete => "deleted",
        }
    }
}

/// One change descriptor driving the update-vs-full decision.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub event: ChangeEvent,
    pub path: PathBuf,
    pub ext: String,
}

impl ChangedFile {
    pub fn new(event: ChangeEvent, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self { event, path, ext }
    }
}

/// Aggregate state for one build invocation.
pub struct BuildContext {
    /// Project root (parent of the tool config file).
    pub root_dir: PathBuf,
    /// Output directory the downstream bundler reads from.
    pub build_dir: PathBuf,
    /// Virtual file store all stages read and write.
    pub store: FileStore,
    /// Compile-state flag.
    pub state: Mutex<BuildState>,
    /// Diagnostics recorded by the current pass, cleared per pass per source.
    recorded: Mutex<Vec<Diagnostic>>,
}

impl BuildContext {
    pub fn new(root_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            build_dir: build_dir.into(),
            store: FileStore::new(),
            state: Mutex::new(BuildState::Unbuilt),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: BuildState) {
        *self.state.lock() = state;
    }

    pub fn build_state(&self) -> BuildState {
        *self.state.lock()
    }

    /// Drop previously recorded diagnostics from one source (start of a pass).
    pub fn clear_diagnostics(&self, source: DiagnosticSource) {
        self.recorded.lock().retain(|d| d.source != source);
    }

    /// Record diagnostics from the current pass.
    pub fn record_diagnostics(&self, diagnostics: &[Diagnostic]) {
        self.recorded.lock().extend_from_slice(diagnostics);
    }

    pub fn recorded_diagnostics(&self) -> Vec<Diagnostic> {
        self.recorded.lock().clone()
    }

    /// Seed the store from disk: every `.ts` and `.html` file under `src_dir`.
    ///
    /// This is the one bulk disk read per build context; everything after it
    /// operates on the store.
    pub fn seed_from_disk(&self, src_dir: &Path) -> Result<usize> {
        let mut seeded = 0;
        for entry in jwalk::WalkDir::new(src_dir).skip_hidden(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let tracked = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("ts" | "html")
            );
            if !tracked {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read `{}`", path.display()))?;
            self.store.set(&path, Entry::new(&path, content));
            seeded += 1;
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn changed_file_extension() {
        let changed = ChangedFile::new(ChangeEvent::Change, "/app/src/home.page.ts");
        assert_eq!(changed.ext, ".ts");
        assert_eq!(changed.event.label(), "changed");
    }

    #[test]
    fn state_flag_transitions() {
        let ctx = BuildContext::new("/app", "/app/www");
        assert_eq!(ctx.build_state(), BuildState::Unbuilt);
        ctx.set_state(BuildState::Building);
        assert_eq!(ctx.build_state(), BuildState::Building);
        ctx.set_state(BuildState::Built);
        assert_eq!(ctx.build_state(), BuildState::Built);
    }

    #[test]
    fn seed_picks_up_ts_and_html_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "let a = 1;").unwrap();
        fs::write(dir.path().join("a.html"), "<p></p>").unwrap();
        fs::write(dir.path().join("notes.md"), "# nope").unwrap();

        let ctx = BuildContext::new(dir.path(), dir.path().join("www"));
        let seeded = ctx.seed_from_disk(dir.path()).unwrap();
        assert_eq!(seeded, 2);
        assert!(ctx.store.has(&dir.path().join("a.ts")));
        assert!(!ctx.store.has(&dir.path().join("notes.md")));
    }
}
