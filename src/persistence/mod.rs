//! Persistence layer for the knowledge graph store
//!
//! - RocksDB optimistic-transaction database, one column family per structure
//! - Connections bound to their own transaction, drawn from a bounded pool
//! - Root schema record with lazy repair of absent structures
//! - Bounded retry of conflicting transactions

pub mod connection;
pub mod pool;
pub mod retry;
pub mod schema;
pub mod storage;

pub use connection::Connection;
pub use pool::{ConnectionPool, PoolSlot};
pub use retry::{with_retry, ConflictSignal};
pub use schema::{RootSchema, Shape, Structure, StructureMeta};
pub use storage::KgStorage;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Another connection committed an overlapping write first
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Column family error
    #[error("Column family error: {0}")]
    ColumnFamily(String),

    /// Connection used while unopened or closed
    #[error("Connection {0} is not open")]
    ConnectionClosed(u64),

    /// No pool slot freed up within the configured timeout
    #[error("Connection pool exhausted: {capacity} slots busy after {waited_ms} ms")]
    PoolExhausted { capacity: usize, waited_ms: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, StorageError::WriteConflict(_))
    }
}
