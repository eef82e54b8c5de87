//! Filesystem module

pub mod entry;
pub mod ops;

pub use entry::{Entry, EntryInfo, PathQualifiedEntry, SysInfo};
pub use ops::read_directory;
