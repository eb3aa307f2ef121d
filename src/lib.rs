//! KgStore - persistent knowledge graph triple store
//!
//! Stores `(subject, relation, object)` triples between `Q`-prefixed
//! entities and `P`-prefixed relations, indexed four ways so every lookup
//! direction is a prefix scan.
//!
//! # Architecture
//!
//! - [`persistence`]: RocksDB optimistic-transaction database, one column
//!   family per structure, a root schema record, connections bound to their
//!   own transaction and drawn from a bounded pool
//! - [`kg`]: label registry with a lazily built inverse index, the triple
//!   cross-indices with cascading subject delete, bulk loading from nested
//!   JSON, and a read-only adapter
//! - [`model`]: identifier newtypes and member lists
//! - [`config`]: store configuration from defaults, YAML and environment
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use kgstore::{EntityId, KgStorage, RelationId, TripleStore};
//!
//! let storage = KgStorage::open_path("./kgstore_data")?;
//! let mut conn = storage.connect()?;
//!
//! TripleStore::new(&conn).add_triple(
//!     &EntityId::parse("Q90")?,
//!     &RelationId::parse("P17")?,
//!     &[EntityId::parse("Q142")?],
//!     false,
//! )?;
//! conn.commit()?;
//! # Ok::<(), kgstore::KgError>(())
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod kg;
pub mod model;
pub mod persistence;

pub use config::{RetryPolicy, StoreConfig};

pub use model::{EntityId, Id, IdError, Members, RelationId};

pub use persistence::{
    Connection, ConnectionPool, KgStorage, RootSchema, StorageError, StorageResult, Structure,
};

pub use kg::{
    BulkLoader, ExternalGraph, KgAdapter, KgError, KgResult, LabelStatus, LabelRegistry,
    LoadSummary, MergeMode, NestedIndex, RemovalSummary, TripleStore,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
