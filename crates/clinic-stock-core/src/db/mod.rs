//! Database layer for the clinic stock ledger.

mod schema;
mod batches;
mod medicines;
mod patients;
mod transactions;

pub use schema::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;
use tracing::debug;

use crate::config::LedgerConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_config(&LedgerConfig {
            database_path: Some(path.as_ref().to_path_buf()),
            ..LedgerConfig::default()
        })
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open the database named by `config`, in memory when no path is set.
    pub fn open_with_config(config: &LedgerConfig) -> DbResult<Self> {
        let Some(path) = &config.database_path else {
            return Self::open_in_memory();
        };
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened ledger database");

        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one write transaction.
    ///
    /// The outermost call takes the write lock up front (`BEGIN IMMEDIATE`)
    /// and commits only if `f` succeeds; any error rolls everything back.
    /// Calls made while a transaction is already open join it.
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "inventory_batches",
            "medicine_definitions",
            "patients",
            "visits",
            "stock_transactions",
            "stock_transaction_effects",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: DbResult<()> = db.in_transaction(|db| {
            db.conn().execute(
                "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ayesha', 'now')",
                [],
            )?;
            Err(DbError::Constraint("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.conn().is_autocommit());
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let db = Database::open_in_memory().unwrap();
        let result: DbResult<()> = db.in_transaction(|db| {
            db.in_transaction(|db| {
                db.conn().execute(
                    "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ayesha', 'now')",
                    [],
                )?;
                Ok::<_, DbError>(())
            })?;
            Err(DbError::Constraint("outer abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            database_path: Some(dir.path().join("stock.db")),
            ..LedgerConfig::default()
        };
        let db = Database::open_with_config(&config).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
