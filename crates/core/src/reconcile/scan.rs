//! Scanning the destination tree as it currently exists on disk.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::errors::ReconcileError;
use crate::tree::{DesiredEntry, EntryKind, TreePath, HIDDEN_PREFIX};

/// What a symlink's target turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkTargetKind {
    File,
    Directory,
    /// Dangling link.
    Missing,
}

/// Classification of a scanned node. Links are never followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExistingKind {
    Directory,
    /// Regular file (or any other non-directory, non-link node).
    File,
    Symlink {
        target: PathBuf,
        resolves_to: LinkTargetKind,
    },
}

/// One node found under the destination root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExistingEntry {
    pub path: TreePath,
    pub kind: ExistingKind,
}

impl ExistingEntry {
    /// The desired entry this node would satisfy.
    ///
    /// A plain file stands in for a placeholder; a link matches only with
    /// the exact same target string.
    pub fn as_desired(&self) -> DesiredEntry {
        let kind = match &self.kind {
            ExistingKind::Directory => EntryKind::Directory,
            ExistingKind::File => EntryKind::PlaceholderFile,
            ExistingKind::Symlink { target, .. } => EntryKind::SymbolicLink {
                target: target.clone(),
            },
        };
        DesiredEntry {
            path: self.path.clone(),
            kind,
        }
    }
}

impl fmt::Display for ExistingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExistingKind::Directory => write!(f, "dir {}", self.path),
            ExistingKind::File => write!(f, "file {}", self.path),
            ExistingKind::Symlink {
                target,
                resolves_to,
            } => {
                let label = match resolves_to {
                    LinkTargetKind::Directory => "dirlink",
                    LinkTargetKind::File => "link",
                    LinkTargetKind::Missing => "broken link",
                };
                write!(f, "{label} {} -> {}", self.path, target.display())
            }
        }
    }
}

/// Scan everything below `root`, root included, in pre-order.
///
/// Hidden entries and their subtrees are skipped, as are names that are not
/// valid UTF-8 (the tree never creates those). A missing root yields an
/// empty scan. Unreadable subdirectories are logged and skipped.
pub fn scan_tree(root: &Path) -> Result<Vec<ExistingEntry>, ReconcileError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ReconcileError::RootNotDirectory(root.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ReconcileError::ScanFailed {
                path: root.to_path_buf(),
                detail: e.to_string(),
            })
        }
    }

    let mut entries = vec![ExistingEntry {
        path: TreePath::root(),
        kind: ExistingKind::Directory,
    }];

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable part of destination tree");
                continue;
            }
        };

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let Some(path) = TreePath::from_relative(rel) else {
            warn!(path = %entry.path().display(), "skipping entry with a non-UTF-8 name");
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        };

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            classify_link(entry.path())
        } else if file_type.is_dir() {
            ExistingKind::Directory
        } else {
            ExistingKind::File
        };
        entries.push(ExistingEntry { path, kind });
    }

    Ok(entries)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with(HIDDEN_PREFIX)
}

fn classify_link(path: &Path) -> ExistingKind {
    let target = fs::read_link(path).unwrap_or_default();
    let resolves_to = match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => LinkTargetKind::Directory,
        Ok(_) => LinkTargetKind::File,
        Err(_) => LinkTargetKind::Missing,
    };
    ExistingKind::Symlink {
        target,
        resolves_to,
    }
}
