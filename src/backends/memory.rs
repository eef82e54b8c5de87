//! In-memory backend

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use reqwest::Url;

use super::{BackendError, BackendResult, RootIdentity, StorageBackend};
use crate::cancel::CancelToken;
use crate::fs::Entry;
use crate::utils;

/// A directory tree held in memory.
///
/// Directories map child names to "is directory" flags. Paths are
/// normalized, so `/tmp/` and `/tmp` are the same directory.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    home: Option<String>,
    dirs: RwLock<HashMap<String, BTreeMap<String, bool>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryBackend {
    /// Create an empty tree containing only `/`.
    pub fn new(name: impl Into<String>) -> Self {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), BTreeMap::new());
        Self {
            name: name.into(),
            home: None,
            dirs: RwLock::new(dirs),
        }
    }

    /// Set the target of `~` expansion.
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(utils::normalize_path(&home.into()));
        self
    }

    /// Add a directory, creating missing parents.
    pub fn with_dir(self, path: &str) -> Self {
        self.insert(path, true);
        self
    }

    /// Add a file, creating missing parent directories.
    pub fn with_file(self, path: &str) -> Self {
        self.insert(path, false);
        self
    }

    /// Whether `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        let path = utils::normalize_path(path);
        if path == "/" {
            return true;
        }
        let (Some(parent), Some(name)) = (utils::parent_path(&path), file_name(&path)) else {
            return false;
        };
        self.dirs
            .read()
            .map(|dirs| dirs.get(&parent).is_some_and(|c| c.contains_key(name)))
            .unwrap_or(false)
    }

    fn insert(&self, path: &str, is_dir: bool) {
        let path = utils::normalize_path(path);
        let Ok(mut dirs) = self.dirs.write() else {
            return;
        };
        let mut current = path.clone();
        let mut child_is_dir = is_dir;
        while let (Some(parent), Some(name)) = (utils::parent_path(&current), file_name(&current)) {
            dirs.entry(parent.clone())
                .or_default()
                .insert(name.to_string(), child_is_dir);
            if child_is_dir {
                dirs.entry(current.clone()).or_default();
            }
            current = parent;
            child_is_dir = true;
        }
    }

    fn create(&self, path: &str, is_dir: bool) -> BackendResult<()> {
        let norm = utils::normalize_path(path);
        let (Some(parent), Some(name)) = (utils::parent_path(&norm), file_name(&norm)) else {
            return Err(BackendError::Other {
                path: path.to_string(),
                message: "cannot create the root".to_string(),
            });
        };
        let mut dirs = self.dirs.write().map_err(|_| poisoned(path))?;
        let children = dirs.get_mut(&parent).ok_or_else(|| BackendError::NotFound {
            path: parent.clone(),
        })?;
        if children.contains_key(name) {
            return Err(BackendError::Other {
                path: path.to_string(),
                message: "already exists".to_string(),
            });
        }
        children.insert(name.to_string(), is_dir);
        if is_dir {
            dirs.insert(norm, BTreeMap::new());
        }
        Ok(())
    }
}

fn file_name(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|n| !n.is_empty())
}

fn poisoned(path: &str) -> BackendError {
    BackendError::Other {
        path: path.to_string(),
        message: "memory backend lock poisoned".to_string(),
    }
}

fn check(cancel: &CancelToken, path: &str) -> BackendResult<()> {
    if cancel.is_cancelled() {
        Err(BackendError::cancelled(path))
    } else {
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn root(&self) -> RootIdentity {
        let url = Url::parse(&format!("memory://{}/", self.name))
            .unwrap_or_else(|_| Url::parse("memory://memory/").expect("static URL is valid"));
        RootIdentity {
            title: self.name.clone(),
            url,
            path: "/".to_string(),
        }
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
        check(cancel, path)?;
        let dirs = self.dirs.read().map_err(|_| poisoned(path))?;
        let children = dirs
            .get(&utils::normalize_path(path))
            .ok_or_else(|| BackendError::NotFound {
                path: path.to_string(),
            })?;
        Ok(children
            .iter()
            .map(|(name, is_dir)| Entry::new(name.clone(), *is_dir))
            .collect())
    }

    fn create_directory(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        self.create(path, true)
    }

    fn create_file(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        self.create(path, false)
    }

    fn delete(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        let norm = utils::normalize_path(path);
        let (Some(parent), Some(name)) = (utils::parent_path(&norm), file_name(&norm)) else {
            return Err(BackendError::PermissionDenied {
                path: path.to_string(),
            });
        };
        let mut dirs = self.dirs.write().map_err(|_| poisoned(path))?;
        if dirs.get(&norm).is_some_and(|c| !c.is_empty()) {
            return Err(BackendError::Other {
                path: path.to_string(),
                message: "directory not empty".to_string(),
            });
        }
        let removed = dirs
            .get_mut(&parent)
            .and_then(|children| children.remove(name));
        match removed {
            Some(_) => {
                dirs.remove(&norm);
                Ok(())
            }
            None => Err(BackendError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn home_path(&self) -> Option<String> {
        self.home.clone()
    }
}
