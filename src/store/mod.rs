//! Virtual file store: the authoritative path → content map for one build.
//!
//! Every later stage reads and writes here instead of the disk, which is what
//! keeps the edit/rebuild loop off the filesystem hot path. Keys are
//! canonicalized absolute paths; callers canonicalize, the store never does.
//!
//! There is no eviction. The store lives exactly as long as its enclosing
//! [`crate::core::BuildContext`] and is dropped wholesale with it.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::path::{Path, PathBuf};

/// One source or generated artifact. Mutable; last write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub content: String,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// In-memory map of all entries for one build context.
///
/// Concurrent incremental updates each touch only their own keys, so the map
/// is sharded rather than globally locked.
#[derive(Debug, Default)]
pub struct FileStore {
    entries: DashMap<PathBuf, Entry, FxBuildHasher>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by its canonicalized path.
    pub fn get(&self, path: &Path) -> Option<Entry> {
        self.entries.get(path).map(|e| e.clone())
    }

    /// Insert or replace the entry at `path`.
    pub fn set(&self, path: impl Into<PathBuf>, entry: Entry) {
        self.entries.insert(path.into(), entry);
    }

    pub fn has(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn delete(&self, path: &Path) -> Option<Entry> {
        self.entries.remove(path).map(|(_, e)| e)
    }

    /// Snapshot of all entries, order unspecified.
    pub fn all(&self) -> Vec<Entry> {
        self.entries.iter().map(|e| e.clone()).collect()
    }

    /// Snapshot of all keys, order unspecified.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
