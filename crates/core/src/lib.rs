//! reftree core library.
//!
//! This crate mirrors a reference catalog (collections, items and their
//! attachments) onto a directory tree: catalog extraction and modelling,
//! name scrubbing and collision-safe naming, desired-tree construction, and
//! the filesystem reconciler that converges the destination onto it.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod namer;
pub mod reconcile;
pub mod scrub;
pub mod tree;

// Re-exports for convenience.
pub use catalog::{CatalogModel, CatalogProvider, CatalogSnapshot, ZoteroProvider};
pub use config::AppConfig;
pub use engine::{MirrorEngine, PassStats};
pub use reconcile::Reconciler;
pub use tree::{DesiredTree, TreeBuilder};
