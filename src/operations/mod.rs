//! Long-running bulk operations
//!
//! Each operation runs on its own thread with its own cancellation token and
//! reports progress through a caller-supplied sink.

mod delete;
mod generate;
mod runner;

pub use delete::delete_entries;
pub use generate::{TreeLayout, generate_tree};
pub use runner::{
    Operation, OperationContext, OperationEvent, OperationHandle, OperationKind, Outcome,
    Progress, ProgressSink,
};

use std::sync::Arc;

use thiserror::Error;

use crate::backends::BackendError;

/// Why an operation did not complete
#[derive(Error, Debug, Clone)]
pub enum OperationError {
    #[error("{path}: {source}")]
    Entry {
        /// Entry the operation stopped at
        path: String,
        #[source]
        source: Arc<BackendError>,
    },
    #[error("invalid operation: {0}")]
    Invalid(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation thread terminated unexpectedly")]
    Aborted,
}

impl OperationError {
    pub fn entry(path: impl Into<String>, source: BackendError) -> Self {
        OperationError::Entry {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
