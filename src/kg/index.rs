//! Two-level index over a nested structure
//!
//! Entries live under the composite key `(primary, secondary)`; a primary
//! "row" is every entry sharing its primary key.

use std::collections::BTreeMap;
use tracing::debug;

use crate::model::Members;
use crate::persistence::schema::{composite_key, row_prefix, split_key};
use crate::persistence::{Connection, Shape, StorageResult, Structure};

use super::{KgError, KgResult};

/// How new members combine with an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Keep existing members and add the new ones after them
    Append,
    /// Overwrite the entry
    Replace,
}

impl MergeMode {
    pub fn from_replace(replace: bool) -> Self {
        if replace {
            MergeMode::Replace
        } else {
            MergeMode::Append
        }
    }
}

/// Which branch of the merge rule an update took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Primary key was absent; a new row was started
    CreatedRow,
    /// Primary present, secondary absent
    CreatedEntry,
    Replaced,
    Appended,
}

/// Nested structure accessed through one connection's transaction
#[derive(Clone, Copy)]
pub struct NestedIndex<'c, 'db> {
    conn: &'c Connection<'db>,
    structure: Structure,
}

impl<'c, 'db> NestedIndex<'c, 'db> {
    pub fn new(conn: &'c Connection<'db>, structure: Structure) -> Self {
        debug_assert_eq!(structure.shape(), Shape::Nested);
        Self { conn, structure }
    }

    pub fn structure(&self) -> Structure {
        self.structure
    }

    pub fn get(&self, primary: &str, secondary: &str) -> StorageResult<Option<Members>> {
        self.conn
            .get_value(self.structure, &composite_key(primary, secondary))
    }

    pub fn contains_primary(&self, primary: &str) -> StorageResult<bool> {
        self.conn.has_prefix(self.structure, &row_prefix(primary))
    }

    /// Every entry of one primary key, ordered by secondary key
    pub fn row(&self, primary: &str) -> StorageResult<BTreeMap<String, Members>> {
        let mut row = BTreeMap::new();
        for (key, value) in self.conn.scan_prefix(self.structure, &row_prefix(primary))? {
            if let Some((_, secondary)) = split_key(&key) {
                row.insert(secondary, bincode::deserialize(&value)?);
            }
        }
        Ok(row)
    }

    pub fn put(&self, primary: &str, secondary: &str, members: &Members) -> StorageResult<()> {
        self.conn
            .put_value(self.structure, &composite_key(primary, secondary), members)
    }

    /// Get-or-create-or-merge on `(primary, secondary)`
    ///
    /// Absent primary or secondary key, or [`MergeMode::Replace`], sets the
    /// entry to `members`; otherwise `members` are appended.
    pub fn merge(
        &self,
        primary: &str,
        secondary: &str,
        members: &Members,
        mode: MergeMode,
    ) -> KgResult<MergeOutcome> {
        if members.is_empty() {
            return Err(KgError::UnsupportedMergeMode(format!(
                "empty member list for {}[{}][{}]",
                self.structure, primary, secondary
            )));
        }

        let outcome = match self.get(primary, secondary)? {
            None if !self.contains_primary(primary)? => {
                self.put(primary, secondary, members)?;
                MergeOutcome::CreatedRow
            }
            None => {
                self.put(primary, secondary, members)?;
                MergeOutcome::CreatedEntry
            }
            Some(_) if mode == MergeMode::Replace => {
                self.put(primary, secondary, members)?;
                MergeOutcome::Replaced
            }
            Some(mut existing) => {
                existing.append(members);
                self.put(primary, secondary, &existing)?;
                MergeOutcome::Appended
            }
        };

        debug!(
            "{}[{}][{}] updated: {:?}",
            self.structure, primary, secondary, outcome
        );
        Ok(outcome)
    }

    /// Remove one entry, returning it if present
    pub fn remove(&self, primary: &str, secondary: &str) -> StorageResult<Option<Members>> {
        let existing = self.get(primary, secondary)?;
        if existing.is_some() {
            self.conn
                .delete_raw(self.structure, &composite_key(primary, secondary))?;
        }
        Ok(existing)
    }

    /// Remove a whole primary row, returning it
    pub fn take_row(&self, primary: &str) -> StorageResult<BTreeMap<String, Members>> {
        let mut row = BTreeMap::new();
        for (key, value) in self.conn.scan_prefix(self.structure, &row_prefix(primary))? {
            self.conn.delete_raw(self.structure, &key)?;
            if let Some((_, secondary)) = split_key(&key) {
                row.insert(secondary, bincode::deserialize(&value)?);
            }
        }
        Ok(row)
    }

    /// Drop every occurrence of `member` from one entry
    ///
    /// Returns `None` when the entry does not exist, otherwise the number of
    /// occurrences removed. With `prune_empty` an entry left empty is deleted.
    pub fn remove_member(
        &self,
        primary: &str,
        secondary: &str,
        member: &str,
        prune_empty: bool,
    ) -> StorageResult<Option<usize>> {
        let Some(mut members) = self.get(primary, secondary)? else {
            return Ok(None);
        };
        let removed = members.remove_all(member);
        if removed == 0 {
            return Ok(Some(0));
        }

        let key = composite_key(primary, secondary);
        if prune_empty && members.is_empty() {
            self.conn.delete_raw(self.structure, &key)?;
            debug!("Pruned empty entry {}[{}][{}]", self.structure, primary, secondary);
        } else {
            self.conn.put_value(self.structure, &key, &members)?;
        }
        Ok(Some(removed))
    }

    /// Number of distinct primary keys
    pub fn primary_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        let mut last: Option<String> = None;
        for (key, _) in self.conn.scan_all(self.structure)? {
            if let Some((primary, _)) = split_key(&key) {
                if last.as_deref() != Some(primary.as_str()) {
                    count += 1;
                    last = Some(primary);
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::KgStorage;
    use tempfile::TempDir;

    #[test]
    fn test_merge_branches() {
        let dir = TempDir::new().unwrap();
        let storage = KgStorage::open_path(dir.path()).unwrap();
        let conn = storage.connect().unwrap();
        let index = NestedIndex::new(&conn, Structure::SubjectTriples);

        let q2 = Members::from_seq(["Q2"]);
        let q3 = Members::from_seq(["Q3"]);

        assert_eq!(index.merge("Q1", "P1", &q2, MergeMode::Append).unwrap(), MergeOutcome::CreatedRow);
        assert_eq!(index.merge("Q1", "P2", &q2, MergeMode::Append).unwrap(), MergeOutcome::CreatedEntry);
        assert_eq!(index.merge("Q1", "P1", &q3, MergeMode::Append).unwrap(), MergeOutcome::Appended);
        assert_eq!(index.get("Q1", "P1").unwrap().unwrap().as_slice(), &["Q2", "Q3"]);

        assert_eq!(index.merge("Q1", "P1", &q3, MergeMode::Replace).unwrap(), MergeOutcome::Replaced);
        assert_eq!(index.get("Q1", "P1").unwrap().unwrap().as_slice(), &["Q3"]);
    }

    #[test]
    fn test_merge_rejects_empty_members() {
        let dir = TempDir::new().unwrap();
        let storage = KgStorage::open_path(dir.path()).unwrap();
        let conn = storage.connect().unwrap();
        let index = NestedIndex::new(&conn, Structure::ObjectTriples);

        let err = index.merge("Q1", "P1", &Members::new(), MergeMode::Replace).unwrap_err();
        assert!(matches!(err, KgError::UnsupportedMergeMode(_)));
    }

    #[test]
    fn test_take_row_and_remove_member() {
        let dir = TempDir::new().unwrap();
        let storage = KgStorage::open_path(dir.path()).unwrap();
        let conn = storage.connect().unwrap();
        let index = NestedIndex::new(&conn, Structure::RelationObjectSubject);

        index.put("P1", "Q2", &Members::from_seq(["Q1", "Q5"])).unwrap();
        index.put("P1", "Q3", &Members::from_seq(["Q1"])).unwrap();

        assert_eq!(index.remove_member("P1", "Q2", "Q1", true).unwrap(), Some(1));
        assert_eq!(index.remove_member("P1", "Q3", "Q1", true).unwrap(), Some(1));
        assert!(index.get("P1", "Q3").unwrap().is_none());
        assert_eq!(index.remove_member("P1", "Q9", "Q1", true).unwrap(), None);
        assert_eq!(index.primary_count().unwrap(), 1);

        let row = index.take_row("P1").unwrap();
        assert_eq!(row.len(), 1);
        assert!(!index.contains_primary("P1").unwrap());
    }
}
