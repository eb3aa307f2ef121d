//! Member collections stored under each (primary, secondary) index key

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered collection of ids stored in a nested index entry
///
/// Incremental writes append and keep duplicates, so the collection
/// behaves as a multiset. Bulk loads build it with [`Members::from_set`],
/// which sorts and deduplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Members(Vec<String>);

impl Members {
    pub fn new() -> Self {
        Members(Vec::new())
    }

    /// Keep the given order and multiplicity
    pub fn from_seq<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Members(items.into_iter().map(Into::into).collect())
    }

    /// Sorted, deduplicated
    pub fn from_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = items.into_iter().map(Into::into).collect();
        Members(set.into_iter().collect())
    }

    pub fn append(&mut self, other: &Members) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Remove every occurrence of `member`, returning how many were dropped
    pub fn remove_all(&mut self, member: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|m| m != member);
        before - self.0.len()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.0.iter().any(|m| m == member)
    }

    pub fn count(&self, member: &str) -> usize {
        self.0.iter().filter(|m| *m == member).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Distinct members, ignoring multiplicity
    pub fn distinct(&self) -> BTreeSet<&str> {
        self.iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Members {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Members::from_seq(iter)
    }
}

impl<'a> IntoIterator for &'a Members {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
