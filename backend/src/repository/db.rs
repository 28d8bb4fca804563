//! Database Connection and Setup
//!
//! Manages the SQLite connection and migrations.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{DomainError, DomainResult};

/// Shared handle to the (possibly closed) connection
pub type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// Database state wrapper
#[derive(Clone)]
pub struct DbState {
    pub conn: SharedConnection,
    pub path: PathBuf,
}

impl DbState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            conn: Arc::new(Mutex::new(None)),
            path,
        }
    }

    /// Shared connection handle for repositories
    pub fn connection(&self) -> SharedConnection {
        self.conn.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Close the connection; repositories sharing it start failing with Internal
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            log::info!("Database closed: {}", self.path.display());
        }
    }
}

/// Open the database at `db_path` (":memory:" for tests) and run migrations
pub async fn init_db(db_path: &Path) -> DomainResult<DbState> {
    let conn = if db_path.as_os_str() == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(db_path)
    }
    .map_err(|e| DomainError::Internal(format!("Failed to open db: {}", e)))?;

    run_migrations(&conn)?;

    let state = DbState::new(db_path.to_path_buf());
    *state.conn.lock().await = Some(conn);
    log::info!("Database ready: {}", db_path.display());

    Ok(state)
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let query = format!("PRAGMA table_info({})", table);
    let Ok(mut stmt) = conn.prepare(&query) else {
        return false;
    };
    let Ok(mut rows) = stmt.query([]) else {
        return false;
    };
    while let Ok(Some(row)) = rows.next() {
        if let Ok(name) = row.get::<_, String>(1) {
            if name == column {
                return true;
            }
        }
    }
    false
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> DomainResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            user_id TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Added after the first release; older files lack it
    if !column_exists(conn, "rows", "updated_at") {
        conn.execute("ALTER TABLE rows ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0", [])
            .map_err(|e| DomainError::Internal(format!("Failed to add updated_at: {}", e)))?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rows_owner ON rows(table_name, user_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.db");

        let first = init_db(&path).await.expect("first init");
        first.close().await;
        assert!(!first.is_open().await);

        let second = init_db(&path).await.expect("second init");
        let guard = second.conn.lock().await;
        let conn = guard.as_ref().unwrap();
        assert!(column_exists(conn, "rows", "updated_at"));
    }
}
