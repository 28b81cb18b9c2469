//! Filesystem reconciler: converge the destination tree to a desired tree.
//!
//! One call to [`Reconciler::reconcile`] scans the destination, diffs it
//! against the desired entries and applies the difference. Entries that
//! already match are never touched, so a second call with the same desired
//! tree performs no operations.

pub mod apply;
pub mod plan;
pub mod scan;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::ReconcileError;
use crate::tree::DesiredTree;

pub use apply::{apply_plan, ApplyReport, OpFailure, OpKind};
pub use plan::ReconcilePlan;
pub use scan::{scan_tree, ExistingEntry, ExistingKind, LinkTargetKind};

/// Result of one reconcile call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub planned_deletes: usize,
    pub planned_creates: usize,
    /// Empty in dry-run mode.
    pub applied: ApplyReport,
}

impl ReconcileReport {
    /// Total operations the plan called for.
    pub fn planned(&self) -> usize {
        self.planned_deletes + self.planned_creates
    }
}

/// Converges the tree below `root`.
#[derive(Debug, Clone)]
pub struct Reconciler {
    root: PathBuf,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dry_run: false,
        }
    }

    /// In dry-run mode the plan is computed and logged but not applied.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Scan and diff without touching anything.
    pub fn plan(&self, desired: &DesiredTree) -> Result<ReconcilePlan, ReconcileError> {
        let existing = scan_tree(&self.root)?;
        debug!(
            existing = existing.len(),
            desired = desired.len(),
            "scanned destination tree"
        );
        Ok(ReconcilePlan::compute(desired.entries(), &existing))
    }

    /// Scan, diff and (unless dry-run) apply.
    ///
    /// Fails only when the destination root itself is unusable; individual
    /// operation failures end up in [`ApplyReport::failures`].
    pub fn reconcile(&self, desired: &DesiredTree) -> Result<ReconcileReport, ReconcileError> {
        if !self.dry_run {
            self.ensure_root()?;
        }

        let plan = self.plan(desired)?;
        let mut report = ReconcileReport {
            dry_run: self.dry_run,
            planned_deletes: plan.to_delete.len(),
            planned_creates: plan.to_create.len(),
            applied: ApplyReport::default(),
        };

        if plan.is_empty() {
            debug!(root = %self.root.display(), "destination tree already up to date");
            return Ok(report);
        }

        if self.dry_run {
            for entry in &plan.to_delete {
                info!("would delete {entry}");
            }
            for entry in &plan.to_create {
                info!("would make {entry}");
            }
            return Ok(report);
        }

        report.applied = apply_plan(&self.root, &plan);
        Ok(report)
    }

    fn ensure_root(&self) -> Result<(), ReconcileError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ReconcileError::RootNotDirectory(self.root.clone())),
            Err(_) => {
                info!(root = %self.root.display(), "creating destination root");
                fs::create_dir_all(&self.root).map_err(|source| ReconcileError::RootUnwritable {
                    path: self.root.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::{
        AttachmentId, AttachmentRecord, CatalogModel, CatalogSnapshot, CollectionId,
        CollectionRecord, ItemId, ItemRecord, MembershipRecord,
    };
    use crate::tree::{FsLocatorResolver, TreeBuilder};

    fn desired_for(snapshot: CatalogSnapshot) -> DesiredTree {
        let model = CatalogModel::build(snapshot).unwrap();
        TreeBuilder::new(&model, &FsLocatorResolver).build()
    }

    fn sample(store: &Path) -> CatalogSnapshot {
        CatalogSnapshot {
            collections: vec![CollectionRecord {
                id: CollectionId(1),
                parent: None,
                name: "Reading".into(),
            }],
            items: vec![
                ItemRecord {
                    id: ItemId(10),
                    display_name: "Knuth D - Literate Programming".into(),
                },
                ItemRecord {
                    id: ItemId(11),
                    display_name: "Hoare C - Quicksort".into(),
                },
            ],
            memberships: vec![MembershipRecord {
                collection: CollectionId(1),
                item: ItemId(10),
            }],
            attachments: vec![AttachmentRecord {
                id: AttachmentId(20),
                item: ItemId(10),
                locator: store.to_string_lossy().into_owned(),
            }],
        }
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("storage/KEY1");
        fs::create_dir_all(&store).unwrap();
        let root = tmp.path().join("mirror");
        let desired = desired_for(sample(&store));
        let reconciler = Reconciler::new(&root);

        let first = reconciler.reconcile(&desired).unwrap();
        assert!(first.planned() > 0);
        assert!(first.applied.failures.is_empty());
        assert!(root.join("+Reading/Knuth D - Literate Programming").is_symlink());
        assert!(root.join("+Unfiled/Hoare C - Quicksort NOPDF").is_file());

        let second = reconciler.reconcile(&desired).unwrap();
        assert_eq!(second.planned(), 0);
        assert_eq!(second.applied, ApplyReport::default());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("storage/KEY1");
        fs::create_dir_all(&store).unwrap();
        let root = tmp.path().join("mirror");
        let desired = desired_for(sample(&store));

        let report = Reconciler::new(&root)
            .dry_run(true)
            .reconcile(&desired)
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.planned_creates, desired.len());
        assert_eq!(report.applied, ApplyReport::default());
        assert!(!root.exists());
    }

    #[test]
    fn test_hidden_and_matching_entries_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mirror");
        fs::create_dir_all(root.join("+Unfiled")).unwrap();
        fs::write(root.join(".index"), b"keep me").unwrap();
        fs::write(root.join("stray.txt"), b"").unwrap();

        let desired = desired_for(CatalogSnapshot::default());
        let report = Reconciler::new(&root).reconcile(&desired).unwrap();

        assert_eq!(report.planned_deletes, 1);
        assert_eq!(report.planned_creates, 0);
        assert_eq!(fs::read(root.join(".index")).unwrap(), b"keep me");
        assert!(!root.join("stray.txt").exists());
    }

    #[test]
    fn test_root_that_is_a_file_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mirror");
        fs::write(&root, b"").unwrap();
        let desired = desired_for(CatalogSnapshot::default());
        assert!(matches!(
            Reconciler::new(&root).reconcile(&desired),
            Err(ReconcileError::RootNotDirectory(_))
        ));
    }
}
