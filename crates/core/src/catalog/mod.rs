//! In-memory catalog: collections, items and attachments.
//!
//! A [`CatalogProvider`] hands over a [`CatalogSnapshot`] of flat relations;
//! [`CatalogModel::build`] validates it and indexes it into an arena that
//! the tree builder walks.

pub mod citation;
pub mod profile;
pub mod watch;
pub mod zotero;

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use crate::errors::CatalogError;

pub use citation::ItemMetadata;
pub use watch::SourceWatcher;
pub use zotero::ZoteroProvider;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! catalog_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

catalog_id!(
    /// Opaque collection identity.
    CollectionId
);
catalog_id!(
    /// Opaque item identity.
    ItemId
);
catalog_id!(
    /// Opaque attachment identity.
    AttachmentId
);

// ---------------------------------------------------------------------------
// Snapshot relations
// ---------------------------------------------------------------------------

/// A collection row: identity, parent (`None` for a top-level collection)
/// and display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: CollectionId,
    pub parent: Option<CollectionId>,
    pub name: String,
}

/// An item row with its already-derived display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub display_name: String,
}

/// An item's membership in one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MembershipRecord {
    pub collection: CollectionId,
    pub item: ItemId,
}

/// An attachment row. The locator is opaque to the model; the tree builder
/// resolves it to a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub item: ItemId,
    pub locator: String,
}

/// Read-only snapshot of everything a provider knows, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub collections: Vec<CollectionRecord>,
    pub items: Vec<ItemRecord>,
    pub memberships: Vec<MembershipRecord>,
    pub attachments: Vec<AttachmentRecord>,
}

/// Source of catalog snapshots.
pub trait CatalogProvider {
    /// Read a fresh snapshot. Called once per reconciliation pass.
    fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError>;
}

impl CatalogProvider for CatalogSnapshot {
    fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        Ok(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A collection in the arena. Indices point into [`CatalogModel`] vectors.
#[derive(Debug, Clone)]
pub struct CollectionNode {
    pub id: CollectionId,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: AttachmentId,
    pub locator: String,
}

#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub id: ItemId,
    pub display_name: String,
    /// `true` when the item belongs to at least one collection.
    pub in_collection: bool,
    pub attachments: Vec<Attachment>,
}

/// Validated, indexed catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogModel {
    collections: Vec<CollectionNode>,
    roots: Vec<usize>,
    items: Vec<CatalogItem>,
    unfiled: Vec<usize>,
}

impl CatalogModel {
    /// Validate `snapshot` and index it.
    ///
    /// Fails on duplicate ids, dangling parents, memberships in unknown
    /// collections, and collections whose ancestry never reaches a root.
    /// Memberships and attachments that name unknown items are dropped.
    pub fn build(snapshot: CatalogSnapshot) -> Result<Self, CatalogError> {
        let CatalogSnapshot {
            collections: collection_rows,
            items: item_rows,
            memberships,
            attachments,
        } = snapshot;

        // -- collections ----------------------------------------------------
        let mut collection_index: HashMap<CollectionId, usize> =
            HashMap::with_capacity(collection_rows.len());
        for (ix, row) in collection_rows.iter().enumerate() {
            if collection_index.insert(row.id, ix).is_some() {
                return Err(CatalogError::DuplicateCollection(row.id.0));
            }
        }

        let mut collections: Vec<CollectionNode> = collection_rows
            .iter()
            .map(|row| CollectionNode {
                id: row.id,
                name: row.name.clone(),
                parent: None,
                children: Vec::new(),
                members: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for (ix, row) in collection_rows.iter().enumerate() {
            match row.parent {
                None => roots.push(ix),
                Some(parent) => {
                    let parent_ix = *collection_index.get(&parent).ok_or(
                        CatalogError::UnknownParent {
                            id: row.id.0,
                            parent: parent.0,
                        },
                    )?;
                    collections[ix].parent = Some(parent_ix);
                    collections[parent_ix].children.push(ix);
                }
            }
        }

        check_reachable(&collections, &roots)?;

        // -- items ----------------------------------------------------------
        let mut item_index: HashMap<ItemId, usize> = HashMap::with_capacity(item_rows.len());
        let mut items = Vec::with_capacity(item_rows.len());
        for (ix, row) in item_rows.into_iter().enumerate() {
            if item_index.insert(row.id, ix).is_some() {
                return Err(CatalogError::DuplicateItem(row.id.0));
            }
            items.push(CatalogItem {
                id: row.id,
                display_name: row.display_name,
                in_collection: false,
                attachments: Vec::new(),
            });
        }

        // -- memberships ----------------------------------------------------
        let mut seen = HashSet::with_capacity(memberships.len());
        for m in memberships {
            let collection_ix =
                *collection_index
                    .get(&m.collection)
                    .ok_or(CatalogError::UnknownCollection {
                        item: m.item.0,
                        collection: m.collection.0,
                    })?;
            let Some(&item_ix) = item_index.get(&m.item) else {
                debug!(item = %m.item, collection = %m.collection, "membership for unknown item skipped");
                continue;
            };
            if !seen.insert(m) {
                continue;
            }
            collections[collection_ix].members.push(item_ix);
            items[item_ix].in_collection = true;
        }

        // -- attachments ----------------------------------------------------
        for a in attachments {
            let Some(&item_ix) = item_index.get(&a.item) else {
                debug!(attachment = %a.id, item = %a.item, "attachment of unknown item skipped");
                continue;
            };
            items[item_ix].attachments.push(Attachment {
                id: a.id,
                locator: a.locator,
            });
        }

        let unfiled = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.in_collection)
            .map(|(ix, _)| ix)
            .collect::<Vec<_>>();

        info!(
            collections = collections.len(),
            items = items.len(),
            unfiled = unfiled.len(),
            "catalog model built"
        );

        Ok(Self {
            collections,
            roots,
            items,
            unfiled,
        })
    }

    /// Indices of top-level collections, in provider order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn collection(&self, ix: usize) -> &CollectionNode {
        &self.collections[ix]
    }

    pub fn collections(&self) -> &[CollectionNode] {
        &self.collections
    }

    pub fn item(&self, ix: usize) -> &CatalogItem {
        &self.items[ix]
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Indices of items that belong to no collection.
    pub fn unfiled(&self) -> &[usize] {
        &self.unfiled
    }
}

/// Every collection must be reachable from a root; anything left over sits
/// on a parent cycle.
fn check_reachable(collections: &[CollectionNode], roots: &[usize]) -> Result<(), CatalogError> {
    let mut visited = vec![false; collections.len()];
    let mut stack: Vec<usize> = roots.to_vec();
    while let Some(ix) = stack.pop() {
        if visited[ix] {
            continue;
        }
        visited[ix] = true;
        stack.extend(collections[ix].children.iter().copied());
    }

    match visited.iter().position(|v| !v) {
        Some(ix) => Err(CatalogError::CyclicAncestry {
            id: collections[ix].id.0,
            name: collections[ix].name.clone(),
        }),
        None => Ok(()),
    }
}
