//! Background directory listing.
//!
//! Each listing runs on its own thread so a slow backend (FTP dial, HTTP
//! fetch, huge local directory) never blocks the presentation thread. The
//! result is handed to a caller-supplied delivery function, which marshals it
//! back to the presentation thread.

pub mod manager;

pub use manager::Loader;

use std::fmt;
use std::sync::Arc;

use crate::backends::{BackendResult, StorageBackend};
use crate::cancel::CancelToken;
use crate::fs::Entry;

/// Request for a directory listing
pub struct IoRequest {
    /// Navigation generation the request belongs to
    pub generation: u64,
    pub path: String,
    pub backend: Arc<dyn StorageBackend>,
    pub cancel: CancelToken,
}

impl fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRequest")
            .field("generation", &self.generation)
            .field("path", &self.path)
            .field("backend", &self.backend.root().title)
            .finish()
    }
}

/// Completed listing, tagged with the generation of its request
#[derive(Debug)]
pub struct IoResponse {
    pub generation: u64,
    pub path: String,
    pub result: BackendResult<Vec<Entry>>,
}
