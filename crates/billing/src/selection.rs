//! The operator's current distribution selection.

use std::collections::BTreeSet;

/// Set of artifact filenames chosen for distribution.
///
/// Invariant (maintained by the tracker, not here): always a subset of the
/// current batch's filenames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    filenames: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>) {
        self.filenames.insert(filename.into());
    }

    pub fn remove(&mut self, filename: &str) {
        self.filenames.remove(filename);
    }

    pub fn clear(&mut self) {
        self.filenames.clear();
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.filenames.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.filenames.iter().cloned().collect()
    }
}
