//! Persisted layout: the nine named structures and the root schema record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column family holding the root schema record
pub const META_CF: &str = "meta";

/// Key of the root schema record inside [`META_CF`]
pub const ROOT_KEY: &[u8] = b"root";

/// Separator between primary and secondary key of a nested structure
const KEY_SEPARATOR: u8 = 0x00;

/// How a structure lays out its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// key -> scalar
    Flat,
    /// primary -> secondary -> members
    Nested,
}

/// One named persistent structure; each lives in its own column family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Structure {
    IdEntity,
    IdRelation,
    InverseEntity,
    SubjectTriples,
    ObjectTriples,
    RelationSubjectObject,
    RelationObjectSubject,
    TypeTriples,
    EntityType,
}

impl Structure {
    pub const ALL: [Structure; 9] = [
        Structure::IdEntity,
        Structure::IdRelation,
        Structure::InverseEntity,
        Structure::SubjectTriples,
        Structure::ObjectTriples,
        Structure::RelationSubjectObject,
        Structure::RelationObjectSubject,
        Structure::TypeTriples,
        Structure::EntityType,
    ];

    pub fn cf_name(self) -> &'static str {
        match self {
            Structure::IdEntity => "id_entity",
            Structure::IdRelation => "id_relation",
            Structure::InverseEntity => "inverse_entity",
            Structure::SubjectTriples => "subject_triples",
            Structure::ObjectTriples => "object_triples",
            Structure::RelationSubjectObject => "relation_subject_object",
            Structure::RelationObjectSubject => "relation_object_subject",
            Structure::TypeTriples => "type_triples",
            Structure::EntityType => "entity_type",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            Structure::IdEntity
            | Structure::IdRelation
            | Structure::InverseEntity
            | Structure::EntityType => Shape::Flat,
            _ => Shape::Nested,
        }
    }

    /// Derived structures are rebuilt from others and never initialised eagerly
    pub fn is_derived(self) -> bool {
        self == Structure::InverseEntity
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cf_name())
    }
}

impl FromStr for Structure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Structure::ALL
            .into_iter()
            .find(|st| st.cf_name() == s)
            .ok_or_else(|| format!("unknown structure: {}", s))
    }
}

/// Bookkeeping kept for every present structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureMeta {
    /// Unix timestamp of registration
    pub created_at: i64,
}

impl StructureMeta {
    pub fn now() -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Root record; a structure is present iff its field is `Some`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootSchema {
    pub id_entity: Option<StructureMeta>,
    pub id_relation: Option<StructureMeta>,
    pub inverse_entity: Option<StructureMeta>,
    pub subject_triples: Option<StructureMeta>,
    pub object_triples: Option<StructureMeta>,
    pub relation_subject_object: Option<StructureMeta>,
    pub relation_object_subject: Option<StructureMeta>,
    pub type_triples: Option<StructureMeta>,
    pub entity_type: Option<StructureMeta>,
}

impl RootSchema {
    /// Schema of a freshly initialised store: every non-derived structure present
    pub fn initialised() -> Self {
        let mut schema = RootSchema::default();
        for structure in Structure::ALL {
            if !structure.is_derived() {
                schema.mark(structure);
            }
        }
        schema
    }

    fn slot(&self, structure: Structure) -> &Option<StructureMeta> {
        match structure {
            Structure::IdEntity => &self.id_entity,
            Structure::IdRelation => &self.id_relation,
            Structure::InverseEntity => &self.inverse_entity,
            Structure::SubjectTriples => &self.subject_triples,
            Structure::ObjectTriples => &self.object_triples,
            Structure::RelationSubjectObject => &self.relation_subject_object,
            Structure::RelationObjectSubject => &self.relation_object_subject,
            Structure::TypeTriples => &self.type_triples,
            Structure::EntityType => &self.entity_type,
        }
    }

    fn slot_mut(&mut self, structure: Structure) -> &mut Option<StructureMeta> {
        match structure {
            Structure::IdEntity => &mut self.id_entity,
            Structure::IdRelation => &mut self.id_relation,
            Structure::InverseEntity => &mut self.inverse_entity,
            Structure::SubjectTriples => &mut self.subject_triples,
            Structure::ObjectTriples => &mut self.object_triples,
            Structure::RelationSubjectObject => &mut self.relation_subject_object,
            Structure::RelationObjectSubject => &mut self.relation_object_subject,
            Structure::TypeTriples => &mut self.type_triples,
            Structure::EntityType => &mut self.entity_type,
        }
    }

    pub fn is_present(&self, structure: Structure) -> bool {
        self.slot(structure).is_some()
    }

    pub fn meta(&self, structure: Structure) -> Option<&StructureMeta> {
        self.slot(structure).as_ref()
    }

    /// Register a structure; keeps the original timestamp if already present
    pub fn mark(&mut self, structure: Structure) {
        self.slot_mut(structure).get_or_insert_with(StructureMeta::now);
    }

    pub fn unmark(&mut self, structure: Structure) {
        *self.slot_mut(structure) = None;
    }

    /// Non-derived structures absent from this schema
    pub fn missing_primary(&self) -> Vec<Structure> {
        Structure::ALL
            .into_iter()
            .filter(|s| !s.is_derived() && !self.is_present(*s))
            .collect()
    }
}

/// Key of a nested entry: `primary 0x00 secondary`
pub fn composite_key(primary: &str, secondary: &str) -> Vec<u8> {
    let mut key = row_prefix(primary);
    key.extend_from_slice(secondary.as_bytes());
    key
}

/// Prefix shared by every entry of one primary key
pub fn row_prefix(primary: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(primary.len() + 1);
    key.extend_from_slice(primary.as_bytes());
    key.push(KEY_SEPARATOR);
    key
}

/// Split a composite key back into (primary, secondary)
pub fn split_key(key: &[u8]) -> Option<(String, String)> {
    let pos = key.iter().position(|b| *b == KEY_SEPARATOR)?;
    let primary = std::str::from_utf8(&key[..pos]).ok()?;
    let secondary = std::str::from_utf8(&key[pos + 1..]).ok()?;
    Some((primary.to_string(), secondary.to_string()))
}
