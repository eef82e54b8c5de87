//! Git-backed status source

use std::path::Path;
use std::process::Command;

use crate::status::{StatusRecord, StatusSource};

/// Computes status by running the `git` command line tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitStatusSource;

impl GitStatusSource {
    pub fn new() -> Self {
        Self
    }
}

impl StatusSource for GitStatusSource {
    fn status(&self, path: &Path, is_dir: bool) -> Option<StatusRecord> {
        get_git_status(path, is_dir)
    }
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Get git status for a file or directory. `None` outside a repository.
pub fn get_git_status(path: &Path, is_dir: bool) -> Option<StatusRecord> {
    let (dir, target) = if is_dir {
        (path, ".".to_string())
    } else {
        (
            path.parent()?,
            path.file_name()?.to_string_lossy().into_owned(),
        )
    };

    let repo_root = git(dir, &["rev-parse", "--show-toplevel"])?.trim().to_string();

    let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
        .map(|b| b.trim().to_string())
        .map(|branch| {
            if branch == "HEAD" {
                // Detached HEAD - show short commit hash
                git(dir, &["rev-parse", "--short", "HEAD"])
                    .map(|h| format!(":{}", h.trim()))
                    .unwrap_or(branch)
            } else {
                branch
            }
        });

    let porcelain = git(dir, &["status", "--porcelain", "--branch", "--", target.as_str()])?;
    let mut record = parse_porcelain(&porcelain);
    record.repo_root = repo_root;
    record.branch = branch;
    Some(record)
}

/// Parse `git status --porcelain --branch` output.
pub fn parse_porcelain(output: &str) -> StatusRecord {
    let mut record = StatusRecord::default();

    for line in output.lines() {
        if let Some(branch_line) = line.strip_prefix("##") {
            // ## main...origin/main [ahead 1, behind 2]
            if let Some(start) = branch_line.find('[') {
                let info = &branch_line[start..];
                record.ahead = count_after(info, "ahead ");
                record.behind = count_after(info, "behind ");
            }
        } else if line.len() >= 2 {
            let mut chars = line.chars();
            let index = chars.next().unwrap_or(' ');
            let worktree = chars.next().unwrap_or(' ');
            record.changed += 1;

            if index != ' ' && index != '?' {
                record.staged = true;
            }
            if worktree != ' ' && worktree != '?' {
                record.dirty = true;
            }
            if index == '?' {
                record.untracked = true;
            }
        }
    }

    record
}

fn count_after(info: &str, label: &str) -> u32 {
    let Some(pos) = info.find(label) else {
        return 0;
    };
    let digits: String = info[pos + label.len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}
