//! Per-batch exclusive locks.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use super::{LedgerError, LedgerResult};

/// In-process lock table keyed by batch ID.
///
/// Locks are taken one at a time in sorted ID order, so two callers that
/// need overlapping batch sets can never wait on each other in a cycle.
#[derive(Debug, Default)]
pub struct BatchLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl BatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every listed batch is held by this caller.
    pub fn acquire<I, S>(&self, batch_ids: I) -> LedgerResult<BatchGuard<'_>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = batch_ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();

        let mut guard = BatchGuard {
            locks: self,
            ids: Vec::with_capacity(ids.len()),
        };
        let mut held = self.held.lock().map_err(|_| LedgerError::LockPoisoned)?;
        for id in ids {
            while held.contains(&id) {
                held = self
                    .released
                    .wait(held)
                    .map_err(|_| LedgerError::LockPoisoned)?;
            }
            held.insert(id.clone());
            guard.ids.push(id);
        }
        Ok(guard)
    }

    /// Whether a batch is currently locked.
    pub fn is_locked(&self, batch_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(batch_id))
            .unwrap_or(false)
    }
}

/// Releases its batches when dropped.
#[derive(Debug)]
pub struct BatchGuard<'a> {
    locks: &'a BatchLocks,
    ids: Vec<String>,
}

impl BatchGuard<'_> {
    /// Batches held, in acquisition order.
    pub fn batch_ids(&self) -> &[String] {
        &self.ids
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in &self.ids {
            held.remove(id);
        }
        self.locks.released.notify_all();
    }
}
