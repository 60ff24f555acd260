//! Stock ledger: transaction engine, compensation and catalog maintenance.
//!
//! Every stock-changing operation runs in two phases. The planning phase
//! works out which batches are touched and takes their locks; the apply
//! phase opens one database transaction, checks the plan still holds,
//! stages every new stock value, validates them all, then writes.
//!
//! ```text
//!  plan ──► lock batches (sorted) ──► BEGIN IMMEDIATE ──► re-plan ──┬─► stage + validate ──► write ──► COMMIT
//!                                                                  └─► plan moved: ROLLBACK, retry
//! ```

mod catalog;
mod compensation;
mod engine;
mod locks;
mod resolver;

pub use catalog::*;
pub use compensation::*;
pub use engine::*;
pub use locks::*;
pub use resolver::*;

use thiserror::Error;
use tracing::debug;

use crate::codec::ParseError;
use crate::db::{Database, DbError};

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient stock in batch {batch_id}: {available} available, {requested} requested")]
    InsufficientStock {
        batch_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Medicine not found: {0}")]
    MedicineNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Visit not found: {0}")]
    VisitNotFound(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Visit {visit_id} does not belong to patient {patient_id}")]
    PatientMismatch { visit_id: String, patient_id: String },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Transaction type {0} is not allowed here")]
    UnsupportedTransactionType(&'static str),

    #[error("Reversing {transaction_id} would leave batch {batch_id} at {available} with {required} to remove")]
    CompensationBlocked {
        transaction_id: String,
        batch_id: String,
        available: i64,
        required: i64,
    },

    #[error("Batch resolution kept changing after {0} attempts")]
    ResolutionChanged(u32),

    #[error("Invalid combination: {0}")]
    InvalidCombination(#[from] ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch lock table poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(DbError::Sqlite(e))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Default attempts before giving up on a moving resolution.
pub const DEFAULT_MAX_RESOLUTION_RETRIES: u32 = 3;

/// Entry point for every stock-affecting operation.
///
/// Borrowing the database and lock table keeps the ledger cheap to build per
/// call; the lock table must be shared by every ledger that writes to the
/// same database file.
pub struct Ledger<'a, R: BatchResolver = LatestBatchResolver> {
    db: &'a Database,
    locks: &'a BatchLocks,
    resolver: R,
    max_retries: u32,
}

impl<'a> Ledger<'a> {
    /// Create a ledger using newest-batch resolution.
    pub fn new(db: &'a Database, locks: &'a BatchLocks) -> Self {
        Self::with_resolver(db, locks, LatestBatchResolver)
    }
}

impl<'a, R: BatchResolver> Ledger<'a, R> {
    /// Create a ledger with a custom batch resolver.
    pub fn with_resolver(db: &'a Database, locks: &'a BatchLocks, resolver: R) -> Self {
        Self {
            db,
            locks,
            resolver,
            max_retries: DEFAULT_MAX_RESOLUTION_RETRIES,
        }
    }

    /// Set how many times a moving plan is re-tried.
    pub fn max_resolution_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    /// Plan, lock, then apply inside one database transaction.
    ///
    /// `plan` runs once before locking and again inside the transaction; if
    /// the two results differ the transaction is rolled back and the whole
    /// cycle repeats, up to the retry limit.
    fn run_locked<P, T, PF, AF>(&self, plan: PF, mut apply: AF) -> LedgerResult<T>
    where
        P: LockPlan,
        PF: Fn(&Database) -> LedgerResult<P>,
        AF: FnMut(&Database, P) -> LedgerResult<T>,
    {
        for attempt in 1..=self.max_retries {
            let planned = plan(self.db)?;
            let _guard = self.locks.acquire(planned.lock_ids())?;

            let outcome = self.db.in_transaction(|db| {
                let current = plan(db)?;
                if current != planned {
                    return Err(LedgerError::ResolutionChanged(attempt));
                }
                apply(db, current)
            });

            match outcome {
                Err(LedgerError::ResolutionChanged(_)) if attempt < self.max_retries => {
                    debug!(attempt, "Batch plan moved while locking, retrying");
                }
                Err(LedgerError::ResolutionChanged(_)) => {
                    return Err(LedgerError::ResolutionChanged(attempt));
                }
                other => return other,
            }
        }
        Err(LedgerError::ResolutionChanged(self.max_retries))
    }
}

/// A planned operation that knows which batches it must lock.
pub(crate) trait LockPlan: PartialEq {
    fn lock_ids(&self) -> Vec<String>;
}
