//! Filesystem walk producing candidate files.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use testguard_domain::{FileRole, ScanPolicy};
use testguard_types::{Finding, RuleId, Severity};

/// A file selected for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub abs: PathBuf,
    /// Root-relative path with forward slashes.
    pub rel: String,
    pub role: FileRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    File(FileEntry),
    /// A walk problem already turned into a finding (io-error, symlink-cycle).
    Problem(Finding),
}

/// Walks a root with the scan filters of a compiled policy.
///
/// Every call to [`Scanner::entries`] starts a fresh walk, sorted by file name.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    root: PathBuf,
    policy: &'a ScanPolicy,
}

impl<'a> Scanner<'a> {
    pub fn new(root: impl Into<PathBuf>, policy: &'a ScanPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = ScanEntry> + '_ {
        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !self.is_ignored(e))
            .filter_map(move |res| match res {
                Ok(entry) => self.classify(&entry),
                Err(err) => Some(ScanEntry::Problem(self.walk_problem(&err))),
            })
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let rel = relative_path(&self.root, entry.path());
        let ignored = self.policy.is_ignored(Path::new(&rel));
        if ignored {
            debug!(path = %rel, "ignored");
        }
        ignored
    }

    fn classify(&self, entry: &DirEntry) -> Option<ScanEntry> {
        if !entry.file_type().is_file() {
            return None;
        }
        let rel = relative_path(&self.root, entry.path());
        let role = self.policy.classify(Path::new(&rel))?;
        Some(ScanEntry::File(FileEntry {
            abs: entry.path().to_path_buf(),
            rel,
            role,
        }))
    }

    fn walk_problem(&self, err: &walkdir::Error) -> Finding {
        let path = err.path().unwrap_or(&self.root);
        let rel = relative_path(&self.root, path);

        if let Some(ancestor) = err.loop_ancestor() {
            warn!(path = %rel, "symlink cycle skipped");
            return Finding::file_level(
                RuleId::SymlinkCycle,
                Severity::Warning,
                rel,
                format!(
                    "symlink cycle: points back to `{}`",
                    relative_path(&self.root, ancestor)
                ),
            );
        }

        let reason = err
            .io_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| err.to_string());
        warn!(path = %rel, error = %reason, "walk error");
        Finding::file_level(
            RuleId::IoError,
            Severity::Error,
            rel,
            format!("could not read directory entry: {reason}"),
        )
    }
}

/// Root-relative path with forward slashes; `.` for the root itself.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
