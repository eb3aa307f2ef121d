//! Triple cross-indices and their mutation API
//!
//! Every triple (s, r, o) is written to four indices:
//! - subject_triples:          s -> r -> [o]
//! - object_triples:           o -> r -> [s]
//! - relation_subject_object:  r -> s -> [o]
//! - relation_object_subject:  r -> o -> [s]
//!
//! All four are updated through the same transaction, so other connections
//! see either none or all of a triple.

use tracing::{debug, info, warn};

use crate::model::{EntityId, Id, Members, RelationId};
use crate::persistence::{Connection, Structure};

use super::index::{MergeMode, NestedIndex};
use super::labels::LabelRegistry;
use super::KgResult;

/// What a cascading delete touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Relations dropped from the subject's row
    pub relations: usize,
    /// Entries removed from relation_subject_object
    pub relation_subject_entries: usize,
    /// Subject occurrences removed from relation_object_subject
    pub relation_object_links: usize,
    /// relation_object_subject entries pruned because they became empty
    pub pruned_entries: usize,
    /// Subject occurrences removed from object_triples
    pub object_links: usize,
    /// Lookups that found nothing to remove
    pub missing: usize,
}

impl RemovalSummary {
    pub fn is_noop(&self) -> bool {
        self.relations == 0
    }
}

/// Triple indices seen through one connection's transaction
#[derive(Clone, Copy)]
pub struct TripleStore<'c, 'db> {
    conn: &'c Connection<'db>,
}

impl<'c, 'db> TripleStore<'c, 'db> {
    pub fn new(conn: &'c Connection<'db>) -> Self {
        Self { conn }
    }

    pub fn subject(&self) -> NestedIndex<'c, 'db> {
        NestedIndex::new(self.conn, Structure::SubjectTriples)
    }

    pub fn object(&self) -> NestedIndex<'c, 'db> {
        NestedIndex::new(self.conn, Structure::ObjectTriples)
    }

    pub fn relation_subject(&self) -> NestedIndex<'c, 'db> {
        NestedIndex::new(self.conn, Structure::RelationSubjectObject)
    }

    pub fn relation_object(&self) -> NestedIndex<'c, 'db> {
        NestedIndex::new(self.conn, Structure::RelationObjectSubject)
    }

    pub fn type_triples(&self) -> NestedIndex<'c, 'db> {
        NestedIndex::new(self.conn, Structure::TypeTriples)
    }

    /// Add `subject -relation-> o` for every `o` in `objects`
    ///
    /// With `replace` the existing entries are overwritten, otherwise the
    /// new members are appended after them (duplicates kept). Missing
    /// label entries are created unlabeled; existing labels are untouched.
    ///
    /// Those placeholder writes mean two connections introducing the same
    /// new id conflict at commit even when their triples are disjoint; run
    /// concurrent writers through [`KgStorage::transact`] to retry.
    ///
    /// [`KgStorage::transact`]: crate::persistence::KgStorage::transact
    pub fn add_triple(
        &self,
        subject: &EntityId,
        relation: &RelationId,
        objects: &[EntityId],
        replace: bool,
    ) -> KgResult<()> {
        let mode = MergeMode::from_replace(replace);
        let (s, r) = (subject.as_str(), relation.as_str());
        let object_members = Members::from_seq(objects.iter().map(EntityId::as_str));
        let subject_member = Members::from_seq([s]);

        self.subject().merge(s, r, &object_members, mode)?;
        self.relation_subject().merge(r, s, &object_members, mode)?;
        for object in objects {
            let o = object.as_str();
            self.relation_object().merge(r, o, &subject_member, mode)?;
            self.object().merge(o, r, &subject_member, mode)?;
        }

        let labels = LabelRegistry::new(self.conn);
        labels.add_label(&Id::from(subject), None)?;
        labels.add_label(&Id::from(relation), None)?;
        for object in objects {
            labels.add_label(&Id::from(object), None)?;
        }

        debug!("Added {} -{}-> {} object(s)", s, r, objects.len());
        Ok(())
    }

    /// Remove `subject` and every triple it is the subject of
    ///
    /// Safe to repeat: missing entries are logged and skipped. The subject's
    /// label entry and any type index references are left in place.
    pub fn remove_subject(&self, subject: &EntityId) -> KgResult<RemovalSummary> {
        let s = subject.as_str();
        let mut summary = RemovalSummary::default();

        let row = self.subject().take_row(s)?;
        if row.is_empty() {
            info!("Entity '{}' is not present in subject_triples", s);
            return Ok(summary);
        }
        summary.relations = row.len();

        for (relation, objects) in &row {
            match self.relation_subject().remove(relation, s)? {
                Some(removed) => {
                    summary.relation_subject_entries += 1;
                    debug!("Removed {:?} from relation_subject_object", removed.as_slice());
                }
                None => {
                    summary.missing += 1;
                    warn!("No objects deleted from relation_subject_object[{}][{}]", relation, s);
                }
            }

            for object in objects.distinct() {
                match self.relation_object().remove_member(relation, object, s, true)? {
                    Some(n) if n > 0 => {
                        summary.relation_object_links += n;
                        if self.relation_object().get(relation, object)?.is_none() {
                            summary.pruned_entries += 1;
                        }
                    }
                    _ => {
                        summary.missing += 1;
                        warn!(
                            "No subjects deleted from relation_object_subject[{}][{}]",
                            relation, object
                        );
                    }
                }

                match self.object().remove_member(object, relation, s, false)? {
                    Some(n) if n > 0 => summary.object_links += n,
                    _ => {
                        summary.missing += 1;
                        warn!("No subjects deleted from object_triples[{}][{}]", object, relation);
                    }
                }
            }
        }

        info!(
            "Removed subject '{}' ({} relations, {} pruned entries)",
            s, summary.relations, summary.pruned_entries
        );
        Ok(summary)
    }
}
