//! Error types for the reftree core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

/// Errors raised while reading or validating a catalog snapshot.
///
/// Any of these aborts the current pass before the destination tree is
/// touched.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A collection's ancestry loops back on itself.
    #[error("collection {id} ('{name}') has cyclic ancestry")]
    CyclicAncestry { id: i64, name: String },

    /// A collection names a parent that does not exist.
    #[error("collection {id} references unknown parent collection {parent}")]
    UnknownParent { id: i64, parent: i64 },

    /// A membership pair names a collection that does not exist.
    #[error("item {item} is a member of unknown collection {collection}")]
    UnknownCollection { item: i64, collection: i64 },

    /// The same collection id appears twice in the snapshot.
    #[error("duplicate collection id {0}")]
    DuplicateCollection(i64),

    /// The same item id appears twice in the snapshot.
    #[error("duplicate item id {0}")]
    DuplicateItem(i64),

    /// The catalog source file is missing or cannot be stat'ed.
    #[error("catalog source unreachable at '{path}': {source}")]
    SourceUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog source was reachable but could not be read.
    #[error("failed to read catalog source: {0}")]
    Source(String),

    /// Underlying SQLite error.
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O wrapper (temporary copies and the like).
    #[error("catalog I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading, validation and profile discovery.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// No Zotero database could be found in any known profile location.
    #[error("no zotero.sqlite found (searched: {searched})")]
    DatabaseNotFound { searched: String },

    /// More than one candidate profile was found.
    #[error("ambiguous Zotero profile: {0}")]
    AmbiguousProfile(String),

    /// The current platform is not supported.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconcile errors
// ---------------------------------------------------------------------------

/// Fatal errors from the filesystem reconciler.
///
/// Per-entry failures are not errors; they are collected in
/// [`crate::reconcile::ApplyReport::failures`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The destination root exists but is not a directory.
    #[error("destination root '{0}' is not a directory")]
    RootNotDirectory(PathBuf),

    /// The destination root could not be created.
    #[error("cannot create destination root '{path}': {source}")]
    RootUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scanning the destination tree failed outright.
    #[error("failed to scan destination tree at '{path}': {detail}")]
    ScanFailed { path: PathBuf, detail: String },
}
