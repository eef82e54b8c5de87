//! Version-control status enrichment
//!
//! Entries of a loaded snapshot that live on the local filesystem get a
//! short status badge computed in the background by a [`StatusSource`].
//! Results are kept in a [`StatusCache`] owned by the navigator and merged
//! back on the presentation thread only while still relevant.

mod cache;
mod record;
mod workers;

pub use cache::{Completion, Lookup, StatusCache};
pub use record::{StatusRecord, is_repo_root, status_text};
pub use workers::{StatusRequest, StatusWorkers};

use std::path::Path;

/// Computes status for a local path.
///
/// `None` means "no status available" (not a repository, tool missing, ...)
/// and is never treated as an error.
pub trait StatusSource: Send + Sync {
    fn status(&self, path: &Path, is_dir: bool) -> Option<StatusRecord>;
}
