//! Storage backends
//!
//! Backends give the navigator a uniform view over:
//! - the local filesystem
//! - FTP/FTPS servers
//! - HTTP directory indexes (read-only)
//! - an in-memory tree (tests and demos)
//!
//! All paths are backend-relative, `/`-separated strings.

mod ftp;
mod http;
mod local;
mod memory;

pub use ftp::{FtpBackend, FtpConfig, FtpTls};
pub use http::HttpIndexBackend;
pub use local::LocalBackend;
pub use memory::MemoryBackend;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::fs::Entry;
use crate::utils;

/// Error type for backend operations. Every variant names the path that
/// failed.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: connection error: {message}")]
    Connection { path: String, message: String },
    #[error("{path}: authentication failed: {message}")]
    Auth { path: String, message: String },
    #[error("{path}: not found")]
    NotFound { path: String },
    #[error("{path}: permission denied")]
    PermissionDenied { path: String },
    #[error("{path}: {operation} is not supported by this backend")]
    NotSupported {
        path: String,
        operation: &'static str,
    },
    #[error("{path}: HTTP error: {message}")]
    Http { path: String, message: String },
    #[error("{path}: cancelled")]
    Cancelled { path: String },
    #[error("{path}: {message}")]
    Other { path: String, message: String },
}

impl BackendError {
    /// Wrap an I/O error, promoting the kinds callers branch on.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound { path },
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied { path },
            _ => BackendError::Io { path, source },
        }
    }

    pub fn cancelled(path: impl Into<String>) -> Self {
        BackendError::Cancelled { path: path.into() }
    }

    /// The path the failing operation was addressed to.
    pub fn path(&self) -> &str {
        match self {
            BackendError::Io { path, .. }
            | BackendError::Connection { path, .. }
            | BackendError::Auth { path, .. }
            | BackendError::NotFound { path }
            | BackendError::PermissionDenied { path }
            | BackendError::NotSupported { path, .. }
            | BackendError::Http { path, .. }
            | BackendError::Cancelled { path }
            | BackendError::Other { path, .. } => path,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Identity of a backend's root, used for display and for telling apart the
/// same path on two different backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootIdentity {
    /// Display title (never contains credentials)
    pub title: String,
    /// Root URL (e.g. `file:///`, `ftp://host/`)
    pub url: Url,
    /// Root path within the backend (e.g. "/")
    pub path: String,
}

impl RootIdentity {
    /// Stable key for persistence and snapshot equality. Credentials are not
    /// part of it.
    pub fn key(&self) -> String {
        let mut url = self.url.clone();
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.to_string()
    }
}

/// Capability set every storage backend implements.
///
/// Implementations must be shareable across threads: listings run on
/// background threads while the navigator keeps its own handle.
pub trait StorageBackend: Send + Sync {
    /// Root identity for display and persistence
    fn root(&self) -> RootIdentity;

    /// List directory contents. Never returns `.` or `..`; order is
    /// unspecified.
    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>>;

    /// Create a directory
    fn create_directory(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        let _ = cancel;
        Err(BackendError::NotSupported {
            path: path.to_string(),
            operation: "create directory",
        })
    }

    /// Create an empty file
    fn create_file(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        let _ = cancel;
        Err(BackendError::NotSupported {
            path: path.to_string(),
            operation: "create file",
        })
    }

    /// Delete a file or an empty directory
    fn delete(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
        let _ = cancel;
        Err(BackendError::NotSupported {
            path: path.to_string(),
            operation: "delete",
        })
    }

    /// Target of `~` expansion, if the backend has one
    fn home_path(&self) -> Option<String> {
        None
    }

    /// Join path components
    fn join_path(&self, base: &str, name: &str) -> String {
        utils::join_path(base, name)
    }

    /// Convert a backend path to a local path. Only backends that live on the
    /// local filesystem return `Some`.
    fn to_local_path(&self, path: &str) -> Option<PathBuf> {
        let _ = path;
        None
    }
}

/// Build a backend from a location string and return it with the path to
/// open first.
///
/// Accepted forms: a local path (absolute, relative or `~`), `file://`,
/// `ftp://` and `ftps://` (explicit TLS; add `?tls=implicit` for implicit
/// TLS), `http://` and `https://` directory indexes.
pub fn from_location(
    location: &str,
    config: &Config,
) -> AppResult<(Arc<dyn StorageBackend>, String)> {
    let invalid = |reason: String| AppError::Location {
        location: location.to_string(),
        reason,
    };

    let Some((scheme, _)) = location.split_once("://") else {
        return Ok(local_location(location));
    };

    let url = Url::parse(location).map_err(|e| invalid(e.to_string()))?;
    match scheme.to_ascii_lowercase().as_str() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| invalid("not a local file URL".to_string()))?;
            Ok(local_location(&path.to_string_lossy()))
        }
        "ftp" | "ftps" => {
            let ftp = FtpConfig::from_url(&url, config.ftp.passive).map_err(invalid)?;
            let path = utils::normalize_path(url.path());
            Ok((Arc::new(FtpBackend::new(ftp)), path))
        }
        "http" | "https" => {
            let timeout = Duration::from_secs(config.http.timeout_secs.max(1));
            let backend = HttpIndexBackend::new(url, timeout).map_err(AppError::Backend)?;
            let path = backend.root().path;
            Ok((Arc::new(backend), path))
        }
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

fn local_location(path: &str) -> (Arc<dyn StorageBackend>, String) {
    let path = if path.starts_with('~') || path.starts_with('/') {
        path.to_string()
    } else {
        std::path::absolute(path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    };
    (Arc::new(LocalBackend::new()), utils::normalize_path(&path))
}
