//! Fixed-size pool of connection slots
//!
//! A connection holds one slot while it is open. When every slot is taken,
//! opening blocks until a slot frees up or the configured timeout elapses.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{StorageError, StorageResult};

pub struct ConnectionPool {
    capacity: usize,
    in_use: Mutex<usize>,
    released: Condvar,
    timeout: Option<Duration>,
}

impl ConnectionPool {
    pub fn new(capacity: usize, timeout: Option<Duration>) -> Self {
        Self {
            capacity,
            in_use: Mutex::new(0),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // the counter stays consistent even if a holder panicked
        self.in_use.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a slot, blocking while the pool is full
    pub fn acquire(&self) -> StorageResult<PoolSlot<'_>> {
        let started = Instant::now();
        let mut in_use = self.lock();

        while *in_use >= self.capacity {
            match self.timeout {
                None => {
                    in_use = self
                        .released
                        .wait(in_use)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(timeout) => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(StorageError::PoolExhausted {
                            capacity: self.capacity,
                            waited_ms: elapsed.as_millis() as u64,
                        });
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(in_use, timeout - elapsed)
                        .unwrap_or_else(|e| e.into_inner());
                    in_use = guard;
                }
            }
        }

        *in_use += 1;
        debug!("Pool slot acquired ({}/{})", *in_use, self.capacity);
        Ok(PoolSlot { pool: self })
    }

    fn release(&self) {
        let mut in_use = self.lock();
        *in_use = in_use.saturating_sub(1);
        debug!("Pool slot released ({}/{})", *in_use, self.capacity);
        drop(in_use);
        self.released.notify_one();
    }
}

/// Occupied slot; returned to the pool on drop
pub struct PoolSlot<'p> {
    pool: &'p ConnectionPool,
}

impl Drop for PoolSlot<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}
