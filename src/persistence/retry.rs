//! Bounded retry on write conflicts

use std::fmt::Display;
use std::thread;
use tracing::warn;

use super::StorageError;
use crate::config::RetryPolicy;

/// Errors that can carry the storage engine's write-conflict signal
pub trait ConflictSignal {
    fn is_write_conflict(&self) -> bool;
}

impl ConflictSignal for StorageError {
    fn is_write_conflict(&self) -> bool {
        StorageError::is_write_conflict(self)
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or the
/// policy's attempts are used up. `op` receives the 1-based attempt number.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: ConflictSignal + Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_write_conflict() && attempt < policy.max_attempts => {
                warn!(
                    "Write conflict on attempt {}/{}: {}. Retrying.",
                    attempt, policy.max_attempts, e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
