//! Local filesystem backend

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;

use super::{BackendError, BackendResult, RootIdentity, StorageBackend};
use crate::cancel::CancelToken;
use crate::fs::Entry;

/// Backend for the local filesystem, rooted at `/`.
#[derive(Debug, Default)]
pub struct LocalBackend {
    home: Option<String>,
}

impl LocalBackend {
    /// Create a local backend using the user's home directory for `~`.
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir().map(|p| p.to_string_lossy().into_owned()),
        }
    }

    /// Override the home directory used for `~` expansion.
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }
}

fn check(cancel: &CancelToken, path: &str) -> BackendResult<()> {
    if cancel.is_cancelled() {
        Err(BackendError::cancelled(path))
    } else {
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn root(&self) -> RootIdentity {
        RootIdentity {
            title: "Local".to_string(),
            url: Url::parse("file:///").expect("static URL is valid"),
            path: "/".to_string(),
        }
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
        check(cancel, path)?;
        let entries =
            crate::fs::read_directory(Path::new(path)).map_err(|e| BackendError::io(path, e))?;
        check(cancel, path)?;
        Ok(entries)
    }

    fn create_directory(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        fs::create_dir(path).map_err(|e| BackendError::io(path, e))
    }

    fn create_file(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| BackendError::io(path, e))
    }

    fn delete(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        check(cancel, path)?;
        let p = Path::new(path);
        let metadata = fs::symlink_metadata(p).map_err(|e| BackendError::io(path, e))?;
        if metadata.is_dir() {
            fs::remove_dir(p).map_err(|e| BackendError::io(path, e))
        } else {
            fs::remove_file(p).map_err(|e| BackendError::io(path, e))
        }
    }

    fn home_path(&self) -> Option<String> {
        self.home.clone()
    }

    fn to_local_path(&self, path: &str) -> Option<PathBuf> {
        Some(PathBuf::from(path))
    }
}
