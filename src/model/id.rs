//! Identifier types for the knowledge graph
//!
//! Entity ids start with `Q`, relation ids with `P`. The prefix is only
//! inspected when a string is parsed; past that point the type carries the
//! classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every entity id
pub const ENTITY_PREFIX: char = 'Q';

/// Prefix of every relation id
pub const RELATION_PREFIX: char = 'P';

/// Identifier classification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Neither the entity nor the relation prefix
    #[error("unrecognised id '{0}': first letter must be 'Q' (entity) or 'P' (relation)")]
    UnknownPrefix(String),

    /// Expected an entity id
    #[error("'{0}' is not an entity id")]
    NotEntity(String),

    /// Expected a relation id
    #[error("'{0}' is not a relation id")]
    NotRelation(String),
}

/// Entity identifier (e.g. `Q42`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.starts_with(ENTITY_PREFIX) {
            Ok(EntityId(raw))
        } else {
            Err(IdError::NotEntity(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityId::parse(s)
    }
}

/// Relation identifier (e.g. `P31`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelationId(String);

impl RelationId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        if raw.starts_with(RELATION_PREFIX) {
            Ok(RelationId(raw))
        } else {
            Err(IdError::NotRelation(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationId::parse(s)
    }
}

/// Any identifier the label registry knows about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Id {
    Entity(EntityId),
    Relation(RelationId),
}

impl Id {
    /// Classify a raw id by its prefix
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        match raw.chars().next() {
            Some(ENTITY_PREFIX) => Ok(Id::Entity(EntityId(raw.to_string()))),
            Some(RELATION_PREFIX) => Ok(Id::Relation(RelationId(raw.to_string()))),
            _ => Err(IdError::UnknownPrefix(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Id::Entity(e) => e.as_str(),
            Id::Relation(r) => r.as_str(),
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Id::Entity(_))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Id::parse(s)
    }
}

impl From<EntityId> for Id {
    fn from(id: EntityId) -> Self {
        Id::Entity(id)
    }
}

impl From<RelationId> for Id {
    fn from(id: RelationId) -> Self {
        Id::Relation(id)
    }
}

impl From<&EntityId> for Id {
    fn from(id: &EntityId) -> Self {
        Id::Entity(id.clone())
    }
}

impl From<&RelationId> for Id {
    fn from(id: &RelationId) -> Self {
        Id::Relation(id.clone())
    }
}
