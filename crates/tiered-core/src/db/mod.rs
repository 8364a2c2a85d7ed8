//! SQLite persistence for coordinator state.
//!
//! Uses rusqlite with WAL mode. All database operations run via
//! `tokio::task::spawn_blocking` so the async runtime never blocks on disk.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::TierError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, TierError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| TierError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| TierError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, TierError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TierError::Database(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Run a closure against the connection, handling locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TierError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TierError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| TierError::Database(e.to_string()))
    }

    /// Async-friendly `with_conn`.
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, TierError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| TierError::Database(format!("Task join error: {}", e)))?
    }

    fn initialize_tables(&self) -> Result<(), TierError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS swarms (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    goal            TEXT NOT NULL,
                    resources       TEXT NOT NULL DEFAULT '{}',
                    config          TEXT NOT NULL DEFAULT '{}',
                    user_id         TEXT NOT NULL DEFAULT '',
                    parent_swarm_id TEXT,
                    status          TEXT NOT NULL DEFAULT 'pending',
                    usage           TEXT NOT NULL DEFAULT '{}',
                    team            TEXT NOT NULL DEFAULT '[]',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_swarms_parent ON swarms(parent_swarm_id);
                CREATE INDEX IF NOT EXISTS idx_swarms_status ON swarms(status);
                ",
            )
        })
    }
}
