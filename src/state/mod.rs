//! Navigation state: snapshots, breadcrumbs, the navigator and its
//! persisted session.

pub mod breadcrumb;
pub mod navigator;
pub mod session;
pub mod snapshot;

pub use breadcrumb::{Breadcrumb, breadcrumbs};
pub use navigator::{LoadFailure, NavigationListener, Navigator};
pub use session::{MemoryStateStore, NavState, StateStore, TomlStateStore};
pub use snapshot::{DirectorySnapshot, SnapshotKey, SnapshotState, sort_entries};
