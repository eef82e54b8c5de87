//! Status records and badge text

/// Repository status for one path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Repository top-level directory
    pub repo_root: String,
    /// Current branch name (`:<hash>` if detached)
    pub branch: Option<String>,
    /// Number of changed paths at or below the target
    pub changed: usize,
    /// Has unstaged modifications
    pub dirty: bool,
    /// Has staged changes
    pub staged: bool,
    /// Has untracked files
    pub untracked: bool,
    /// Commits ahead of upstream
    pub ahead: u32,
    /// Commits behind upstream
    pub behind: u32,
}

impl StatusRecord {
    fn indicators(&self) -> String {
        let mut s = String::new();
        if self.staged {
            s.push('+');
        }
        if self.dirty {
            s.push('*');
        }
        if self.untracked {
            s.push('?');
        }
        s
    }
}

/// Whether `path` is the repository root of `record`.
///
/// Compared as strings, tolerating a single trailing `/` on either side.
pub fn is_repo_root(record: &StatusRecord, path: &str) -> bool {
    let root = record.repo_root.as_str();
    if root.is_empty() {
        return false;
    }
    path == root
        || path.strip_suffix('/') == Some(root)
        || root.strip_suffix('/') == Some(path)
}

/// Badge text for `path`, empty when nothing should be shown.
///
/// Files show their indicators. Directories only show text when they contain
/// changes or are the repository root; the root also shows the branch and
/// upstream divergence.
pub fn status_text(record: &StatusRecord, path: &str, is_dir: bool) -> String {
    if !is_dir {
        return record.indicators();
    }

    let root = is_repo_root(record, path);
    if record.changed == 0 && !root {
        return String::new();
    }

    if !root {
        return format!("[*{}]", record.changed);
    }

    let mut result = format!("[{}", record.branch.as_deref().unwrap_or("HEAD"));
    if record.ahead > 0 {
        result.push_str(&format!("↑{}", record.ahead));
    }
    if record.behind > 0 {
        result.push_str(&format!("↓{}", record.behind));
    }
    let indicators = record.indicators();
    if !indicators.is_empty() {
        result.push(' ');
        result.push_str(&indicators);
    }
    result.push(']');
    result
}
