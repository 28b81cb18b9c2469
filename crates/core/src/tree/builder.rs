//! Derives the desired tree from a catalog model.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   +Collection/
//!     +Subcollection/
//!       Last F - Title - Journal - Year          -> <attachment storage>
//!       Last F - Title - Journal - Year (2)      -> <second attachment>
//!     Other - Untitled NOPDF                      (empty placeholder)
//!   +Unfiled/
//!     ...items that belong to no collection...
//! ```

use std::path::PathBuf;

use tracing::{debug, warn};

use super::{
    DesiredEntry, DesiredTree, TreePath, DEFAULT_COLLECTION_NAME, DEFAULT_ITEM_NAME,
    FOLDER_MARKER, HIDDEN_PREFIX, PLACEHOLDER_SUFFIX, UNFILED_FOLDER,
};
use crate::catalog::CatalogModel;
use crate::namer::CollisionNamer;
use crate::scrub::scrub;

/// Turns an attachment's opaque locator into a link target.
pub trait LocatorResolver {
    /// `None` when the locator does not point at anything that exists.
    fn resolve(&self, locator: &str) -> Option<PathBuf>;
}

impl<F> LocatorResolver for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn resolve(&self, locator: &str) -> Option<PathBuf> {
        self(locator)
    }
}

/// Treats locators as filesystem paths and checks that they exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLocatorResolver;

impl LocatorResolver for FsLocatorResolver {
    fn resolve(&self, locator: &str) -> Option<PathBuf> {
        let path = PathBuf::from(locator);
        path.exists().then_some(path)
    }
}

/// One-shot builder: owns the namer and the growing entry list for a single
/// pass.
pub struct TreeBuilder<'a, R: LocatorResolver + ?Sized> {
    model: &'a CatalogModel,
    resolver: &'a R,
    namer: CollisionNamer,
    entries: Vec<DesiredEntry>,
    omitted_links: usize,
}

impl<'a, R: LocatorResolver + ?Sized> TreeBuilder<'a, R> {
    pub fn new(model: &'a CatalogModel, resolver: &'a R) -> Self {
        Self {
            model,
            resolver,
            namer: CollisionNamer::new(),
            entries: Vec::new(),
            omitted_links: 0,
        }
    }

    /// Walk the model and return the complete desired tree.
    pub fn build(mut self) -> DesiredTree {
        let root = TreePath::root();
        self.entries.push(DesiredEntry::directory(root.clone()));

        let unfiled = root.child(format!("{FOLDER_MARKER}{UNFILED_FOLDER}"));
        self.namer.reserve(&unfiled);

        for &ix in self.model.roots() {
            self.add_collection(ix, &root);
        }

        self.entries.push(DesiredEntry::directory(unfiled.clone()));
        for &item_ix in self.model.unfiled() {
            self.add_item(item_ix, &unfiled);
        }

        debug!(
            entries = self.entries.len(),
            omitted_links = self.omitted_links,
            "desired tree built"
        );
        DesiredTree::new(self.entries, self.omitted_links)
    }

    fn add_collection(&mut self, ix: usize, parent: &TreePath) {
        let model = self.model;
        let collection = model.collection(ix);

        let mut base = scrub(&collection.name);
        if base.is_empty() {
            base = DEFAULT_COLLECTION_NAME.to_string();
        }
        let folder = parent.child(self.namer.allocate_folder(parent, &base));
        self.entries.push(DesiredEntry::directory(folder.clone()));

        for &item_ix in &collection.members {
            self.add_item(item_ix, &folder);
        }
        for &child in &collection.children {
            self.add_collection(child, &folder);
        }
    }

    fn add_item(&mut self, item_ix: usize, folder: &TreePath) {
        let model = self.model;
        let item = model.item(item_ix);
        let name = leaf_name(&item.display_name);

        if item.attachments.is_empty() {
            let segment = self
                .namer
                .allocate(folder, &format!("{name}{PLACEHOLDER_SUFFIX}"));
            self.entries.push(DesiredEntry::placeholder(folder.child(segment)));
            return;
        }

        for attachment in &item.attachments {
            let Some(target) = self.resolver.resolve(&attachment.locator) else {
                warn!(
                    item = %item.id,
                    attachment = %attachment.id,
                    locator = %attachment.locator,
                    folder = %folder,
                    "attachment target does not exist; link omitted"
                );
                self.omitted_links += 1;
                continue;
            };
            let segment = self.namer.allocate(folder, &name);
            self.entries.push(DesiredEntry::link(folder.child(segment), target));
        }
    }
}

/// Scrubbed item name that can never be hidden or empty.
fn leaf_name(display_name: &str) -> String {
    let scrubbed = scrub(display_name);
    let visible = scrubbed.trim_start_matches(HIDDEN_PREFIX).trim_start();
    if visible.is_empty() {
        DEFAULT_ITEM_NAME.to_string()
    } else {
        visible.to_string()
    }
}
