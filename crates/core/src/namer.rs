//! Collision-safe allocation of path segment names.

use std::collections::HashSet;

use tracing::trace;

use crate::tree::{TreePath, FOLDER_MARKER};

/// Hands out path segments that are unique within one reconciliation pass.
///
/// Every issued full path is remembered in case-folded form, so `Foo` and
/// `foo` under the same parent collide. On collision the base name gets a
/// `" (N)"` suffix, starting at 2. A namer lives for one builder run only.
#[derive(Debug, Default)]
pub struct CollisionNamer {
    issued: HashSet<String>,
}

impl CollisionNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a unique segment for `base` under `parent` and record it.
    pub fn allocate(&mut self, parent: &TreePath, base: &str) -> String {
        let mut counter: u32 = 1;
        loop {
            let candidate = if counter == 1 {
                base.to_string()
            } else {
                format!("{base} ({counter})")
            };
            if self.issued.insert(parent.child(candidate.as_str()).collision_key()) {
                if counter > 1 {
                    trace!(parent = %parent, base, counter, "disambiguated name");
                }
                return candidate;
            }
            counter += 1;
        }
    }

    /// Allocate a collection folder name: `base` with the folder marker.
    pub fn allocate_folder(&mut self, parent: &TreePath, base: &str) -> String {
        self.allocate(parent, &format!("{FOLDER_MARKER}{base}"))
    }

    /// Mark `path` as taken without allocating anything.
    ///
    /// Returns `false` if the path had already been issued.
    pub fn reserve(&mut self, path: &TreePath) -> bool {
        self.issued.insert(path.collision_key())
    }
}
