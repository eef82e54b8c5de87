//! Filesystem operations

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::entry::Entry;

/// Read directory contents. `.` and `..` are never included and the order
/// is whatever the OS returns.
pub fn read_directory(path: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        // file_type() does not follow symlinks; a link to a directory should
        // still navigate like one.
        let is_dir = match entry.file_type() {
            Ok(ft) if ft.is_symlink() => entry.path().is_dir(),
            Ok(ft) => ft.is_dir(),
            Err(e) => {
                debug!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        entries.push(Entry::from_os_path(&entry.path(), is_dir));
    }

    Ok(entries)
}
