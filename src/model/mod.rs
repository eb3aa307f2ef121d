//! Core value types shared by the storage and index layers

pub mod id;
pub mod members;

pub use id::{EntityId, Id, IdError, RelationId, ENTITY_PREFIX, RELATION_PREFIX};
pub use members::Members;
