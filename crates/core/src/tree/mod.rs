//! Desired-state tree: path and entry types plus the builder that derives
//! them from a [`CatalogModel`](crate::catalog::CatalogModel).

pub mod builder;

use std::fmt;
use std::path::{Component, Path, PathBuf};

pub use builder::{FsLocatorResolver, LocatorResolver, TreeBuilder};

// ---------------------------------------------------------------------------
// Reserved names
// ---------------------------------------------------------------------------

/// Prefix that marks every collection folder.
pub const FOLDER_MARKER: char = '+';

/// Base name of the synthetic top-level folder for unfiled items.
pub const UNFILED_FOLDER: &str = "Unfiled";

/// Suffix appended to the placeholder file of an item without attachments.
pub const PLACEHOLDER_SUFFIX: &str = " NOPDF";

/// Entries whose name starts with this prefix are never scanned or touched.
pub const HIDDEN_PREFIX: char = '.';

/// Fallback for items whose display name scrubs to nothing.
pub const DEFAULT_ITEM_NAME: &str = "NONAME";

/// Fallback for collections whose name scrubs to nothing.
pub const DEFAULT_COLLECTION_NAME: &str = "Untitled";

// ---------------------------------------------------------------------------
// TreePath
// ---------------------------------------------------------------------------

/// A path relative to the destination root, as an ordered list of segments.
///
/// The empty path is the destination root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// The destination root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments. Segments must not contain separators.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Convert a path relative to the destination root.
    ///
    /// Returns `None` for paths that are not plain relative paths or that
    /// contain non-UTF-8 segments.
    pub fn from_relative(rel: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(Self(segments))
    }

    /// A new path one level below `self`.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Case-folded key used for collision checks.
    pub fn collision_key(&self) -> String {
        self.0.join("/").to_lowercase()
    }

    /// Absolute filesystem path below `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.0 {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.0.join("/"))
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// What kind of node a desired entry is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    /// Empty file standing in for an item without attachments.
    PlaceholderFile,
    /// Symbolic link pointing at an attachment's content.
    SymbolicLink { target: PathBuf },
}

impl EntryKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Directory => "dir",
            Self::PlaceholderFile => "file",
            Self::SymbolicLink { .. } => "link",
        }
    }
}

/// One node of the target tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesiredEntry {
    pub path: TreePath,
    pub kind: EntryKind,
}

impl DesiredEntry {
    pub fn directory(path: TreePath) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
        }
    }

    pub fn placeholder(path: TreePath) -> Self {
        Self {
            path,
            kind: EntryKind::PlaceholderFile,
        }
    }

    pub fn link(path: TreePath, target: PathBuf) -> Self {
        Self {
            path,
            kind: EntryKind::SymbolicLink { target },
        }
    }
}

impl fmt::Display for DesiredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EntryKind::SymbolicLink { target } => {
                write!(f, "link {} -> {}", self.path, target.display())
            }
            kind => write!(f, "{} {}", kind.label(), self.path),
        }
    }
}

/// The complete target tree produced by one builder run.
#[derive(Debug, Clone, Default)]
pub struct DesiredTree {
    entries: Vec<DesiredEntry>,
    omitted_links: usize,
}

impl DesiredTree {
    pub(crate) fn new(entries: Vec<DesiredEntry>, omitted_links: usize) -> Self {
        Self {
            entries,
            omitted_links,
        }
    }

    /// Entries in emission (pre-order) order.
    pub fn entries(&self) -> &[DesiredEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attachment links left out because their locator did not resolve.
    pub fn omitted_links(&self) -> usize {
        self.omitted_links
    }

    /// Look up the entry at `path`.
    pub fn get(&self, path: &TreePath) -> Option<&DesiredEntry> {
        self.entries.iter().find(|e| &e.path == path)
    }
}
