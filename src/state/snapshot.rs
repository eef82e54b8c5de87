//! Directory snapshots

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backends::{RootIdentity, StorageBackend};
use crate::fs::{Entry, PathQualifiedEntry};

/// Identity of a snapshot: the same path on two backends is two different
/// directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub root_url: String,
    pub path: String,
}

/// Lifecycle of the snapshot occupying the navigator's slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    /// Placeholder published while the listing is in flight
    Loading,
    /// Listing succeeded
    Loaded,
    /// Listing failed; children are empty
    Failed(String),
}

/// An immutable listing of one directory on one backend
pub struct DirectorySnapshot {
    store: Arc<dyn StorageBackend>,
    root: RootIdentity,
    path: String,
    children: Vec<Entry>,
    generation: u64,
    state: SnapshotState,
}

impl DirectorySnapshot {
    /// Placeholder shown while `path` loads
    pub fn loading(store: Arc<dyn StorageBackend>, path: String, generation: u64) -> Self {
        Self::build(store, path, Vec::new(), generation, SnapshotState::Loading)
    }

    /// Completed listing; children are put in canonical order
    pub fn loaded(
        store: Arc<dyn StorageBackend>,
        path: String,
        mut children: Vec<Entry>,
        generation: u64,
    ) -> Self {
        sort_entries(&mut children);
        Self::build(store, path, children, generation, SnapshotState::Loaded)
    }

    /// Failed listing; no children so no stale rows survive
    pub fn failed(
        store: Arc<dyn StorageBackend>,
        path: String,
        error: String,
        generation: u64,
    ) -> Self {
        Self::build(store, path, Vec::new(), generation, SnapshotState::Failed(error))
    }

    fn build(
        store: Arc<dyn StorageBackend>,
        path: String,
        children: Vec<Entry>,
        generation: u64,
        state: SnapshotState,
    ) -> Self {
        let root = store.root();
        Self {
            store,
            root,
            path,
            children,
            generation,
            state,
        }
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    pub fn root(&self) -> &RootIdentity {
        &self.root
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn children(&self) -> &[Entry] {
        &self.children
    }

    /// Navigation generation that produced this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == SnapshotState::Loaded
    }

    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            root_url: self.root.key(),
            path: self.path.clone(),
        }
    }

    /// Children paired with this snapshot's directory
    pub fn qualified_children(&self) -> impl Iterator<Item = PathQualifiedEntry> + '_ {
        let dir = PathBuf::from(&self.path);
        self.children
            .iter()
            .map(move |e| PathQualifiedEntry::new(dir.clone(), e.clone()))
    }

    /// Look up a child by name
    pub fn child(&self, name: &str) -> Option<&Entry> {
        self.children.iter().find(|e| e.name() == name)
    }
}

impl PartialEq for DirectorySnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Debug for DirectorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySnapshot")
            .field("root", &self.root.title)
            .field("path", &self.path)
            .field("children", &self.children.len())
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

/// Canonical order: directories first, then by name.
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name().cmp(b.name()),
    });
}
