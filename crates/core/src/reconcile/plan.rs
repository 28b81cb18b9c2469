//! Diffing the scanned tree against the desired tree.

use std::cmp::Reverse;
use std::collections::HashSet;

use super::scan::ExistingEntry;
use crate::tree::DesiredEntry;

/// The operations needed to converge the destination tree.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Deepest first, so children go before their directory.
    pub to_delete: Vec<ExistingEntry>,
    /// Shallowest first, so a directory exists before its children.
    pub to_create: Vec<DesiredEntry>,
}

impl ReconcilePlan {
    /// `to_delete = existing - desired`, `to_create = desired - existing`.
    ///
    /// Entries are equal when path, kind and (for links) target all match;
    /// a link with a changed target is deleted and recreated. Within one
    /// depth the input order is kept.
    pub fn compute(desired: &[DesiredEntry], existing: &[ExistingEntry]) -> Self {
        let desired_set: HashSet<&DesiredEntry> = desired.iter().collect();
        let existing_set: HashSet<DesiredEntry> = existing.iter().map(ExistingEntry::as_desired).collect();

        let mut to_delete: Vec<ExistingEntry> = existing
            .iter()
            .filter(|e| !desired_set.contains(&e.as_desired()))
            .cloned()
            .collect();
        to_delete.sort_by_key(|e| Reverse(e.path.depth()));

        let mut to_create: Vec<DesiredEntry> = desired
            .iter()
            .filter(|d| !existing_set.contains(*d))
            .cloned()
            .collect();
        to_create.sort_by_key(|d| d.path.depth());

        Self {
            to_delete,
            to_create,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }

    /// Total number of filesystem operations.
    pub fn len(&self) -> usize {
        self.to_delete.len() + self.to_create.len()
    }
}
