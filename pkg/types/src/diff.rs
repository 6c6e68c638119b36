//! Set differences between a current and a desired collection of keys.
//!
//! Used both for whole-endpoint classification (keyed by endpoint name) and
//! for backend membership convergence (keyed by [`Target`]).

use std::collections::HashSet;
use std::hash::Hash;

use crate::endpoint::Target;

/// Result of comparing a current set against a desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<K: Eq + Hash> {
    /// In desired, not in current.
    pub to_add: HashSet<K>,
    /// In current, not in desired.
    pub to_remove: HashSet<K>,
    /// In both.
    pub to_retain: HashSet<K>,
}

impl<K: Eq + Hash> Diff<K> {
    /// Nothing to add and nothing to remove.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

impl<K: Eq + Hash + Ord + Clone> Diff<K> {
    pub fn sorted_to_add(&self) -> Vec<K> {
        sorted(&self.to_add)
    }

    pub fn sorted_to_remove(&self) -> Vec<K> {
        sorted(&self.to_remove)
    }

    pub fn sorted_to_retain(&self) -> Vec<K> {
        sorted(&self.to_retain)
    }
}

fn sorted<K: Ord + Clone>(set: &HashSet<K>) -> Vec<K> {
    let mut v: Vec<K> = set.iter().cloned().collect();
    v.sort();
    v
}

/// Compute `(desired - current, current - desired, current ∩ desired)`.
pub fn diff<K: Eq + Hash + Clone>(current: &HashSet<K>, desired: &HashSet<K>) -> Diff<K> {
    Diff {
        to_add: desired.difference(current).cloned().collect(),
        to_remove: current.difference(desired).cloned().collect(),
        to_retain: current.intersection(desired).cloned().collect(),
    }
}

/// [`diff`] over backend targets, keyed by `HostIP:Port`.
pub fn diff_targets(current: &[Target], desired: &[Target]) -> Diff<Target> {
    let current: HashSet<Target> = current.iter().cloned().collect();
    let desired: HashSet<Target> = desired.iter().cloned().collect();
    diff(&current, &desired)
}
