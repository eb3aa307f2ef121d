//! RocksDB storage layer
//!
//! One column family per persisted structure plus a `meta` family for the
//! root schema. The database is opened as an optimistic transaction DB so
//! every connection gets snapshot reads and commit-time conflict checks.

use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, OptimisticTransactionDB, OptimisticTransactionOptions,
    Options, Transaction, WriteOptions,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::pool::ConnectionPool;
use super::retry::{with_retry, ConflictSignal};
use super::schema::{RootSchema, Structure, META_CF};
use super::{StorageError, StorageResult};
use crate::config::StoreConfig;

/// Database type backing every store
pub type TxnDb = OptimisticTransactionDB;

/// Open knowledge-graph store shared by all connections
pub struct KgStorage {
    db: TxnDb,
    pool: ConnectionPool,
    config: StoreConfig,
    next_connection: AtomicU64,
}

impl KgStorage {
    /// Open or create the store described by `config`
    ///
    /// A store without a root schema is initialised; primary structures
    /// missing from an existing schema are registered.
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        config.validate()?;
        let path_str = config
            .path
            .to_str()
            .ok_or_else(|| StorageError::Config(format!("non-UTF-8 path: {:?}", config.path)))?
            .to_string();

        info!("Opening knowledge graph store at: {}", path_str);

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);

        opts.set_write_buffer_size(config.write_buffer_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_min_write_buffer_number_to_merge(1);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let mut cf_descriptors = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(META_CF, Options::default()),
        ];
        for structure in Structure::ALL {
            cf_descriptors.push(ColumnFamilyDescriptor::new(
                structure.cf_name(),
                Self::structure_cf_options(),
            ));
        }

        let db = TxnDb::open_cf_descriptors(&opts, &path_str, cf_descriptors)?;
        let pool = ConnectionPool::new(config.pool_size, config.pool_timeout());

        let storage = Self {
            db,
            pool,
            config,
            next_connection: AtomicU64::new(1),
        };
        storage.bootstrap_schema()?;

        info!("Knowledge graph store opened successfully");
        Ok(storage)
    }

    /// Open a store rooted at `path` with default settings
    pub fn open_path(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open(StoreConfig::at(path))
    }

    fn structure_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn bootstrap_schema(&self) -> StorageResult<()> {
        let mut conn = self.connect()?;
        match conn.schema()? {
            None => {
                info!("No root schema found. Initialising new store structure.");
                conn.put_schema(&RootSchema::initialised())?;
            }
            Some(mut schema) => {
                let missing = schema.missing_primary();
                if missing.is_empty() {
                    debug!("Root schema complete");
                } else {
                    for structure in &missing {
                        warn!("Structure {} not initialised. Registering empty one.", structure);
                        schema.mark(*structure);
                    }
                    conn.put_schema(&schema)?;
                }
            }
        }
        conn.close(true)
    }

    /// Full re-initialisation: empties every structure and writes a fresh schema
    pub fn initialise(&self) -> StorageResult<()> {
        let mut conn = self.connect()?;
        for structure in Structure::ALL {
            let removed = conn.clear(structure)?;
            debug!("Cleared {} entries from {}", removed, structure);
        }
        conn.put_schema(&RootSchema::initialised())?;
        conn.close(true)?;
        info!("Store structure initialised");
        Ok(())
    }

    /// New connection, already open
    pub fn connect(&self) -> StorageResult<Connection<'_>> {
        let mut conn = Connection::new(self);
        conn.open()?;
        Ok(conn)
    }

    /// Run `op` on a fresh connection and commit, retrying on write conflicts
    ///
    /// Each attempt starts from a new transaction, so `op` must be safe to
    /// re-run from scratch.
    pub fn transact<'s, T, E, F>(&'s self, mut op: F) -> Result<T, E>
    where
        E: From<StorageError> + ConflictSignal + std::fmt::Display,
        F: FnMut(&mut Connection<'s>) -> Result<T, E>,
    {
        with_retry(&self.config.retry, |attempt| {
            let mut conn = self.connect()?;
            debug!("Connection {} running transaction attempt {}", conn.id(), attempt);
            let value = op(&mut conn)?;
            conn.close(true)?;
            Ok(value)
        })
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        debug!("Flushed storage to disk");
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) fn cf(&self, name: &str) -> StorageResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamily(name.to_string()))
    }

    pub(crate) fn begin(&self) -> Transaction<'_, TxnDb> {
        let mut txn_opts = OptimisticTransactionOptions::new();
        txn_opts.set_snapshot(true);
        self.db.transaction_opt(&WriteOptions::default(), &txn_opts)
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}
