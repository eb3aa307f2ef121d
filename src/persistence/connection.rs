//! Connections and their transactions
//!
//! Every connection owns exactly one transaction at a time. Writes are
//! visible to the owning connection immediately and to other connections
//! only after [`Connection::commit`]. Reads go through the transaction
//! snapshot taken when the transaction began.

use rocksdb::{Direction, ErrorKind, IteratorMode, ReadOptions, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::pool::PoolSlot;
use super::schema::{RootSchema, Structure, META_CF, ROOT_KEY};
use super::storage::{KgStorage, TxnDb};
use super::{StorageError, StorageResult};

enum ConnectionState<'db> {
    /// Allocated, never opened
    Unopened,
    /// `txn` is only `None` while a finished transaction is being replaced
    Open {
        txn: Option<Transaction<'db, TxnDb>>,
        _slot: PoolSlot<'db>,
    },
    /// Released by `close`; may be reopened
    Closed,
}

/// A logical connection bound to its own transaction
pub struct Connection<'db> {
    storage: &'db KgStorage,
    id: u64,
    state: ConnectionState<'db>,
}

impl<'db> Connection<'db> {
    /// Allocate a connection without opening it
    pub fn new(storage: &'db KgStorage) -> Self {
        Self {
            storage,
            id: storage.next_connection_id(),
            state: ConnectionState::Unopened,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open { .. })
    }

    pub fn storage(&self) -> &'db KgStorage {
        self.storage
    }

    /// Bind a pool slot and a fresh transaction; no-op if already open
    pub fn open(&mut self) -> StorageResult<()> {
        if self.is_open() {
            warn!("Connection {} already opened. Skipping command.", self.id);
            return Ok(());
        }
        let reopening = matches!(self.state, ConnectionState::Closed);
        self.bind()?;
        if reopening {
            info!("Connection {} was closed. Connection reopened.", self.id);
        } else {
            debug!("Connection {} opened", self.id);
        }
        Ok(())
    }

    fn bind(&mut self) -> StorageResult<()> {
        let slot = self.storage.pool().acquire()?;
        self.state = ConnectionState::Open {
            txn: Some(self.storage.begin()),
            _slot: slot,
        };
        Ok(())
    }

    /// Hand out the current transaction so it can be finished
    fn take_transaction(&mut self) -> StorageResult<Transaction<'db, TxnDb>> {
        match &mut self.state {
            ConnectionState::Open { txn, .. } => {
                txn.take().ok_or(StorageError::ConnectionClosed(self.id))
            }
            _ => Err(StorageError::ConnectionClosed(self.id)),
        }
    }

    /// Begin the next transaction; its snapshot sees everything committed so far
    fn restart(&mut self) {
        if let ConnectionState::Open { txn, .. } = &mut self.state {
            *txn = Some(self.storage.begin());
        }
    }

    fn txn(&self) -> StorageResult<&Transaction<'db, TxnDb>> {
        match &self.state {
            ConnectionState::Open { txn: Some(txn), .. } => Ok(txn),
            _ => Err(StorageError::ConnectionClosed(self.id)),
        }
    }

    /// Persist every pending write atomically
    ///
    /// The connection continues with a new transaction whether or not the
    /// commit succeeds. A conflicting commit discards its writes and
    /// returns [`StorageError::WriteConflict`].
    pub fn commit(&mut self) -> StorageResult<()> {
        let txn = self.take_transaction()?;
        let result = txn.commit();
        self.restart();
        match result {
            Ok(()) => {
                debug!("Connection {} committed", self.id);
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                warn!("Connection {} commit conflicted: {}", self.id, e);
                Err(StorageError::WriteConflict(e.into_string()))
            }
            Err(e) => Err(StorageError::RocksDb(e)),
        }
    }

    /// Set a rollback point inside the current transaction
    pub fn savepoint(&self) -> StorageResult<()> {
        self.txn()?.set_savepoint();
        debug!("Connection {} savepoint set", self.id);
        Ok(())
    }

    /// Undo writes made since the most recent savepoint
    pub fn rollback_to_savepoint(&self) -> StorageResult<()> {
        self.txn()?.rollback_to_savepoint()?;
        debug!("Connection {} rolled back to savepoint", self.id);
        Ok(())
    }

    /// Discard every write since the last commit
    pub fn abort(&mut self) -> StorageResult<()> {
        let txn = self.take_transaction()?;
        let result = txn.rollback();
        self.restart();
        result?;
        debug!("Connection {} aborted", self.id);
        Ok(())
    }

    /// Optionally commit, then release the transaction and the pool slot
    pub fn close(&mut self, commit: bool) -> StorageResult<()> {
        if !self.is_open() {
            debug!("Connection {} not open; close ignored", self.id);
            return Ok(());
        }
        let result = if commit { self.commit() } else { Ok(()) };
        self.state = ConnectionState::Closed;
        debug!("Connection {} closed", self.id);
        result
    }

    pub fn get_raw(&self, structure: Structure, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.get_cf(structure.cf_name(), key)
    }

    pub fn put_raw(&self, structure: Structure, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let cf = self.storage.cf(structure.cf_name())?;
        self.txn()?.put_cf(cf, key, value)?;
        Ok(())
    }

    pub fn delete_raw(&self, structure: Structure, key: &[u8]) -> StorageResult<()> {
        let cf = self.storage.cf(structure.cf_name())?;
        self.txn()?.delete_cf(cf, key)?;
        Ok(())
    }

    pub fn get_value<T: DeserializeOwned>(
        &self,
        structure: Structure,
        key: &[u8],
    ) -> StorageResult<Option<T>> {
        match self.get_raw(structure, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_value<T: Serialize>(
        &self,
        structure: Structure,
        key: &[u8],
        value: &T,
    ) -> StorageResult<()> {
        let bytes = bincode::serialize(value)?;
        self.put_raw(structure, key, &bytes)
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(
        &self,
        structure: Structure,
        prefix: &[u8],
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self.txn()?;
        let cf = self.storage.cf(structure.cf_name())?;

        let snapshot = txn.snapshot();
        let mut opts = ReadOptions::default();
        opts.set_snapshot(&snapshot);

        let mut entries = Vec::new();
        let iter = txn.iterator_cf_opt(cf, opts, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Whether any key starts with `prefix`
    pub fn has_prefix(&self, structure: Structure, prefix: &[u8]) -> StorageResult<bool> {
        let txn = self.txn()?;
        let cf = self.storage.cf(structure.cf_name())?;

        let snapshot = txn.snapshot();
        let mut opts = ReadOptions::default();
        opts.set_snapshot(&snapshot);

        let mut iter = txn.iterator_cf_opt(cf, opts, IteratorMode::From(prefix, Direction::Forward));
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(prefix))
            }
            None => Ok(false),
        }
    }

    pub fn scan_all(&self, structure: Structure) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan_prefix(structure, &[])
    }

    pub fn count(&self, structure: Structure) -> StorageResult<usize> {
        Ok(self.scan_all(structure)?.len())
    }

    /// Delete every entry of a structure inside this transaction
    pub fn clear(&self, structure: Structure) -> StorageResult<usize> {
        let entries = self.scan_all(structure)?;
        for (key, _) in &entries {
            self.delete_raw(structure, key)?;
        }
        Ok(entries.len())
    }

    /// Root schema as seen by this transaction; `None` for a fresh file
    pub fn schema(&self) -> StorageResult<Option<RootSchema>> {
        match self.get_cf(META_CF, ROOT_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_schema(&self, schema: &RootSchema) -> StorageResult<()> {
        let cf = self.storage.cf(META_CF)?;
        let bytes = bincode::serialize(schema)?;
        self.txn()?.put_cf(cf, ROOT_KEY, bytes)?;
        Ok(())
    }

    fn get_cf(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let txn = self.txn()?;
        let cf = self.storage.cf(cf_name)?;

        let snapshot = txn.snapshot();
        let mut opts = ReadOptions::default();
        opts.set_snapshot(&snapshot);

        Ok(txn.get_cf_opt(cf, key, &opts)?)
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        if self.is_open() {
            debug!("Connection {} dropped while open; pending writes discarded", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> KgStorage {
        KgStorage::open_path(dir.path()).unwrap()
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let mut conn = storage.connect().unwrap();
        assert_eq!(storage.pool().in_use(), 1);
        conn.open().unwrap();
        assert!(conn.is_open());
        assert_eq!(storage.pool().in_use(), 1);
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let mut conn = Connection::new(&storage);
        assert!(!conn.is_open());
        assert!(matches!(
            conn.get_raw(Structure::IdEntity, b"Q1"),
            Err(StorageError::ConnectionClosed(_))
        ));

        conn.open().unwrap();
        conn.put_raw(Structure::IdEntity, b"Q1", b"v").unwrap();
        conn.close(true).unwrap();
        assert!(!conn.is_open());
        assert_eq!(storage.pool().in_use(), 0);

        conn.open().unwrap();
        assert_eq!(conn.get_raw(Structure::IdEntity, b"Q1").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_own_writes_visible_before_commit() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let writer = storage.connect().unwrap();
        let reader = storage.connect().unwrap();

        writer.put_raw(Structure::IdEntity, b"Q1", b"v").unwrap();
        assert!(writer.get_raw(Structure::IdEntity, b"Q1").unwrap().is_some());
        assert!(reader.get_raw(Structure::IdEntity, b"Q1").unwrap().is_none());
    }

    #[test]
    fn test_committed_writes_stay_visible_and_writable() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let mut conn = storage.connect().unwrap();

        conn.put_raw(Structure::IdEntity, b"Q1", b"first").unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.get_raw(Structure::IdEntity, b"Q1").unwrap(), Some(b"first".to_vec()));
        assert_eq!(conn.scan_all(Structure::IdEntity).unwrap().len(), 1);

        conn.put_raw(Structure::IdEntity, b"Q1", b"second").unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.get_raw(Structure::IdEntity, b"Q1").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_abort_discards_writes() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let mut conn = storage.connect().unwrap();

        conn.put_raw(Structure::IdEntity, b"Q1", b"v").unwrap();
        conn.abort().unwrap();
        assert!(conn.get_raw(Structure::IdEntity, b"Q1").unwrap().is_none());
        assert!(conn.is_open());
    }

    #[test]
    fn test_savepoint_rollback() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let conn = storage.connect().unwrap();

        conn.put_raw(Structure::IdEntity, b"Q1", b"kept").unwrap();
        conn.savepoint().unwrap();
        conn.put_raw(Structure::IdEntity, b"Q2", b"dropped").unwrap();
        conn.rollback_to_savepoint().unwrap();

        assert!(conn.get_raw(Structure::IdEntity, b"Q1").unwrap().is_some());
        assert!(conn.get_raw(Structure::IdEntity, b"Q2").unwrap().is_none());
    }

    #[test]
    fn test_scan_prefix_includes_uncommitted() {
        let dir = TempDir::new().unwrap();
        let storage = open_store(&dir);
        let conn = storage.connect().unwrap();

        conn.put_raw(Structure::SubjectTriples, b"Q1\0P1", b"a").unwrap();
        conn.put_raw(Structure::SubjectTriples, b"Q1\0P2", b"b").unwrap();
        conn.put_raw(Structure::SubjectTriples, b"Q10\0P1", b"c").unwrap();

        let row = conn.scan_prefix(Structure::SubjectTriples, b"Q1\0").unwrap();
        assert_eq!(row.len(), 2);
        assert!(conn.has_prefix(Structure::SubjectTriples, b"Q10\0").unwrap());
        assert!(!conn.has_prefix(Structure::SubjectTriples, b"Q2\0").unwrap());
    }
}
