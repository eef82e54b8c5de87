//! Directory entry representation

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

/// Metadata of an entry, fetched on demand for OS-backed entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryInfo {
    /// File size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Platform-specific payload
    pub sys: SysInfo,
}

/// Platform-specific metadata. Remote backends fill what their listing
/// format exposes and leave the rest empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SysInfo {
    /// Unix permission bits (0 if unknown)
    pub mode: u32,
    /// Owner user name
    pub owner: String,
    /// Owner group name
    pub group: String,
}

#[derive(Clone, Debug)]
enum Source {
    /// Lives on the local filesystem; info is read lazily from this path.
    Os(PathBuf),
    /// Synthesized from a remote listing.
    Synthetic,
}

/// A single file or directory as returned by a backend listing.
///
/// Entries do not know the directory they were listed from; pair them with
/// it through [`PathQualifiedEntry`] when an absolute path is needed.
#[derive(Clone)]
pub struct Entry {
    name: String,
    is_dir: bool,
    source: Source,
    info: OnceLock<Option<EntryInfo>>,
}

impl Entry {
    /// Create a synthesized entry.
    ///
    /// # Panics
    /// If `name` is empty or contains a path separator. Backends must hand
    /// over bare names; anything else is a bug in the caller.
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        let name = name.into();
        assert_valid_name(&name);
        Self {
            name,
            is_dir,
            source: Source::Synthetic,
            info: OnceLock::new(),
        }
    }

    /// Create an entry whose info is already known (remote listings).
    pub fn with_info(name: impl Into<String>, is_dir: bool, info: EntryInfo) -> Self {
        let entry = Self::new(name, is_dir);
        let _ = entry.info.set(Some(info));
        entry
    }

    /// Create an entry backed by a local path. Info is read on first access.
    pub fn from_os_path(path: &Path, is_dir: bool) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        assert_valid_name(&name);
        Self {
            name,
            is_dir,
            source: Source::Os(path.to_path_buf()),
            info: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Entry metadata, fetched and memoized on first call for OS-backed
    /// entries. `None` if it could not be read or the backend does not
    /// provide it.
    pub fn info(&self) -> Option<&EntryInfo> {
        self.info
            .get_or_init(|| match &self.source {
                Source::Os(path) => read_info(path, self.is_dir),
                Source::Synthetic => None,
            })
            .as_ref()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir)
            .finish()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.is_dir == other.is_dir
    }
}

impl Eq for Entry {}

fn assert_valid_name(name: &str) {
    assert!(!name.is_empty(), "entry name must not be empty");
    assert!(
        !name.contains('/') && !name.chars().any(std::path::is_separator),
        "entry name {:?} contains a path separator",
        name
    );
}

/// An entry paired with the directory it was listed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathQualifiedEntry {
    dir: PathBuf,
    entry: Entry,
}

impl PathQualifiedEntry {
    pub fn new(dir: impl Into<PathBuf>, entry: Entry) -> Self {
        Self {
            dir: dir.into(),
            entry,
        }
    }

    /// Absolute path of the entry.
    pub fn full_name(&self) -> PathBuf {
        self.dir.join(self.entry.name())
    }

    /// Directory containing the entry.
    pub fn dir_path(&self) -> &Path {
        &self.dir
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

fn read_info(path: &Path, is_dir: bool) -> Option<EntryInfo> {
    let metadata = fs::symlink_metadata(path).ok()?;
    // Follow symlinks for size, keep the link's own ownership and mode
    let target = if metadata.is_symlink() {
        fs::metadata(path).ok()
    } else {
        Some(metadata.clone())
    };
    let size = if is_dir {
        0
    } else {
        target.as_ref().map(|m| m.len()).unwrap_or(0)
    };

    #[cfg(unix)]
    let sys = {
        use std::os::unix::fs::MetadataExt;
        SysInfo {
            mode: metadata.mode(),
            owner: get_username(metadata.uid()),
            group: get_groupname(metadata.gid()),
        }
    };
    #[cfg(not(unix))]
    let sys = SysInfo::default();

    Some(EntryInfo {
        size,
        modified: metadata.modified().ok(),
        sys,
    })
}

/// Get username from uid (Unix only)
#[cfg(unix)]
fn get_username(uid: u32) -> String {
    use std::ffi::CStr;

    // SAFETY: getpwuid accepts any uid; the returned record is only read
    // before the next call on this thread.
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() || (*pw).pw_name.is_null() {
            return uid.to_string();
        }
        CStr::from_ptr((*pw).pw_name)
            .to_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| uid.to_string())
    }
}

/// Get group name from gid (Unix only)
#[cfg(unix)]
fn get_groupname(gid: u32) -> String {
    use std::ffi::CStr;

    // SAFETY: getgrgid accepts any gid; see get_username.
    unsafe {
        let gr = libc::getgrgid(gid);
        if gr.is_null() || (*gr).gr_name.is_null() {
            return gid.to_string();
        }
        CStr::from_ptr((*gr).gr_name)
            .to_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| gid.to_string())
    }
}
