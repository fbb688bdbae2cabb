#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}

/// Returns an empty [`map::HashSet`] regardless of the hasher backing it.
pub fn new_set<T>() -> map::HashSet<T> {
    map::HashSet::default()
}
