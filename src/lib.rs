//! burrow - directory navigation over local, FTP and HTTP index backends
//!
//! The crate is the engine behind a two-pane file browser: storage backends,
//! immutable directory snapshots, a navigator that loads them in the
//! background and drops stale results, git status enrichment and cancellable
//! bulk operations. Presentation is left to [`state::NavigationListener`]
//! implementations.

pub mod async_io;
pub mod backends;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod fs;
pub mod git;
pub mod operations;
pub mod state;
pub mod status;
pub mod utils;

pub use backends::{BackendError, StorageBackend};
pub use cancel::CancelToken;
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use state::{DirectorySnapshot, Navigator};
