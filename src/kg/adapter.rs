//! Read-only view of the store for query and action consumers

use std::collections::BTreeMap;
use tracing::info;

use crate::model::{EntityId, Id, Members, RelationId};
use crate::persistence::{Connection, StorageResult, Structure};

use super::index::NestedIndex;
use super::labels::LabelRegistry;
use super::KgResult;

/// Read access to labels, triples and entity types through one connection
pub struct KgAdapter<'a, 'db> {
    conn: &'a Connection<'db>,
}

impl<'a, 'db> KgAdapter<'a, 'db> {
    /// Attach to `conn`, building the inverse index if absent
    ///
    /// The index is written inside the connection's own transaction and
    /// nothing is committed here; the caller's next commit persists it
    /// along with anything else pending.
    pub fn attach(conn: &'a Connection<'db>) -> KgResult<Self> {
        if LabelRegistry::new(conn).ensure_inverse()? {
            info!("Inverse entity index built for adapter on connection {}", conn.id());
        }
        Ok(Self { conn })
    }

    pub fn labels(&self) -> LabelView<'a, 'db> {
        LabelView {
            registry: LabelRegistry::new(self.conn),
        }
    }

    pub fn triples(&self) -> TripleView<'a, 'db> {
        TripleView { conn: self.conn }
    }

    /// Type value recorded for `id` in `entity_type`
    pub fn entity_type(&self, id: &EntityId) -> KgResult<Option<String>> {
        let value: Option<Option<String>> = self
            .conn
            .get_value(Structure::EntityType, id.as_str().as_bytes())?;
        Ok(value.flatten())
    }
}

/// Label lookups
pub struct LabelView<'a, 'db> {
    registry: LabelRegistry<'a, 'db>,
}

impl<'a, 'db> LabelView<'a, 'db> {
    pub fn entity(&self, id: &EntityId) -> KgResult<Option<String>> {
        self.registry.get(&Id::from(id))
    }

    pub fn relation(&self, id: &RelationId) -> KgResult<Option<String>> {
        self.registry.get(&Id::from(id))
    }

    pub fn inverse(&self, label: &str) -> KgResult<Option<EntityId>> {
        self.registry.inverse(label)
    }
}

/// The five nested indices, read-only
pub struct TripleView<'a, 'db> {
    conn: &'a Connection<'db>,
}

impl<'a, 'db> TripleView<'a, 'db> {
    fn index(&self, structure: Structure) -> ReadIndex<'a, 'db> {
        ReadIndex(NestedIndex::new(self.conn, structure))
    }

    pub fn subject(&self) -> ReadIndex<'a, 'db> {
        self.index(Structure::SubjectTriples)
    }

    pub fn object(&self) -> ReadIndex<'a, 'db> {
        self.index(Structure::ObjectTriples)
    }

    pub fn relation_subject(&self) -> ReadIndex<'a, 'db> {
        self.index(Structure::RelationSubjectObject)
    }

    pub fn relation_object(&self) -> ReadIndex<'a, 'db> {
        self.index(Structure::RelationObjectSubject)
    }

    pub fn type_triples(&self) -> ReadIndex<'a, 'db> {
        self.index(Structure::TypeTriples)
    }
}

/// A [`NestedIndex`] with only its read operations exposed
#[derive(Clone, Copy)]
pub struct ReadIndex<'a, 'db>(NestedIndex<'a, 'db>);

impl<'a, 'db> ReadIndex<'a, 'db> {
    pub fn structure(&self) -> Structure {
        self.0.structure()
    }

    pub fn get(&self, primary: &str, secondary: &str) -> StorageResult<Option<Members>> {
        self.0.get(primary, secondary)
    }

    pub fn row(&self, primary: &str) -> StorageResult<BTreeMap<String, Members>> {
        self.0.row(primary)
    }

    pub fn contains_primary(&self, primary: &str) -> StorageResult<bool> {
        self.0.contains_primary(primary)
    }

    pub fn primary_count(&self) -> StorageResult<usize> {
        self.0.primary_count()
    }
}
