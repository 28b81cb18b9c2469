//! Change detection on the catalog source file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::errors::CatalogError;

/// Tracks the modification time of a file between polls.
#[derive(Debug, Clone)]
pub struct SourceWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SourceWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` on the first call and whenever the modification time differs
    /// from the one seen by the previous call.
    ///
    /// A missing file is an error; it does not count as a change.
    pub fn poll(&mut self) -> Result<bool, CatalogError> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| CatalogError::SourceUnreachable {
                path: self.path.clone(),
                source,
            })?;

        let changed = self.last_modified != Some(modified);
        if changed {
            debug!(path = %self.path.display(), "catalog source changed");
        }
        self.last_modified = Some(modified);
        Ok(changed)
    }

    /// Forget the last seen time so the next poll reports a change.
    pub fn reset(&mut self) {
        self.last_modified = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_poll_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zotero.sqlite");
        fs::write(&path, b"v1").unwrap();

        let mut watcher = SourceWatcher::new(&path);
        assert!(watcher.poll().unwrap());
        assert!(!watcher.poll().unwrap());
    }

    #[test]
    fn test_modification_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zotero.sqlite");
        fs::write(&path, b"v1").unwrap();

        let mut watcher = SourceWatcher::new(&path);
        watcher.poll().unwrap();

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
        assert!(watcher.poll().unwrap());
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zotero.sqlite");
        fs::write(&path, b"v1").unwrap();

        let mut watcher = SourceWatcher::new(&path);
        watcher.poll().unwrap();
        watcher.reset();
        assert!(watcher.poll().unwrap());
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut watcher = SourceWatcher::new("/nonexistent/zotero.sqlite");
        assert!(matches!(
            watcher.poll(),
            Err(CatalogError::SourceUnreachable { .. })
        ));
    }
}
