//! Applying a reconcile plan to the filesystem.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::plan::ReconcilePlan;
use super::scan::{ExistingEntry, ExistingKind};
use crate::tree::{DesiredEntry, EntryKind};

/// Which half of the plan an operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Delete,
    Create,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A single filesystem operation that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    pub op: OpKind,
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub deleted: usize,
    pub created: usize,
    pub failures: Vec<OpFailure>,
}

/// Apply `plan` below `root`: all deletions, then all creations.
///
/// A failing operation is logged and recorded; the rest of the plan still
/// runs.
pub fn apply_plan(root: &Path, plan: &ReconcilePlan) -> ApplyReport {
    let mut report = ApplyReport::default();

    for entry in &plan.to_delete {
        if entry.path.is_root() {
            continue;
        }
        let abs = entry.path.to_path(root);
        info!("deleting {entry}");
        match delete_entry(entry, &abs) {
            Ok(()) => report.deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %abs.display(), "already gone");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(path = %abs.display(), error = %e, "delete failed");
                report.failures.push(OpFailure {
                    op: OpKind::Delete,
                    path: abs,
                    error: e.to_string(),
                });
            }
        }
    }

    for entry in &plan.to_create {
        let abs = entry.path.to_path(root);
        info!("making {entry}");
        match create_entry(entry, &abs) {
            Ok(()) => report.created += 1,
            Err(e) => {
                warn!(path = %abs.display(), error = %e, "creation failed");
                report.failures.push(OpFailure {
                    op: OpKind::Create,
                    path: abs,
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

fn delete_entry(entry: &ExistingEntry, abs: &Path) -> io::Result<()> {
    match entry.kind {
        ExistingKind::Directory => fs::remove_dir_all(abs),
        ExistingKind::File | ExistingKind::Symlink { .. } => fs::remove_file(abs),
    }
}

fn create_entry(entry: &DesiredEntry, abs: &Path) -> io::Result<()> {
    match &entry.kind {
        EntryKind::Directory => fs::create_dir_all(abs),
        EntryKind::PlaceholderFile => fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(abs)
            .map(drop),
        EntryKind::SymbolicLink { target } => {
            if !target.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("link target {} does not exist", target.display()),
                ));
            }
            make_symlink(target, abs)
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are only supported on Unix",
    ))
}
