//! Association set differ.
//!
//! Pure and deterministic: the same inputs always yield the same, sorted
//! outputs. An empty `desired` set means "remove every association"; callers
//! that want "leave untouched" must not call the differ at all.

use std::collections::BTreeSet;

/// Minimal changes turning `current` into `desired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDiff<T> {
    /// `desired − current`, ascending.
    pub to_add: Vec<T>,
    /// `current − desired`, ascending.
    pub to_remove: Vec<T>,
}

impl<T: Ord + Clone> AssociationDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Applies removals then additions to `current`.
    pub fn apply_to(&self, current: &BTreeSet<T>) -> BTreeSet<T> {
        let mut next = current.clone();
        for item in &self.to_remove {
            next.remove(item);
        }
        next.extend(self.to_add.iter().cloned());
        next
    }
}

/// Computes `(desired − current, current − desired)`.
pub fn diff_associations<T: Ord + Clone>(
    current: &BTreeSet<T>,
    desired: &BTreeSet<T>,
) -> AssociationDiff<T> {
    AssociationDiff {
        to_add: desired.difference(current).cloned().collect(),
        to_remove: current.difference(desired).cloned().collect(),
    }
}
