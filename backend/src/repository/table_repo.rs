//! Table Repository Implementation
//!
//! SQLite-backed implementation of Repository<Row>, scoped to one table name
//! and one user. Every committed change is published on the change feed while
//! the connection lock is still held, so feed order matches commit order.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::domain::{DomainError, DomainResult, Row, RowChange};
use crate::faults::FaultPlan;
use crate::realtime::{ChangeFeed, ChangeReceiver};
use super::db::SharedConnection;
use super::traits::Repository;

/// Repository for the rows of `(table, user_id)`
#[derive(Clone)]
pub struct TableRepository {
    conn: SharedConnection,
    table: String,
    user_id: String,
    feed: ChangeFeed,
    faults: FaultPlan,
}

impl TableRepository {
    pub fn new(
        conn: SharedConnection,
        table: impl Into<String>,
        user_id: impl Into<String>,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            conn,
            table: table.into(),
            user_id: user_id.into(),
            feed,
            faults: FaultPlan::new(),
        }
    }

    /// Share a fault plan with this repository
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Same table and connection, scoped to another user
    pub fn for_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Subscribe to changes of this repository's rows
    pub fn subscribe(&self) -> ChangeReceiver {
        self.feed.subscribe(self.table.clone(), self.user_id.clone())
    }

    /// Merge `patch` into the row's columns and return the stored row
    pub async fn merge(&self, id: i64, patch: &Map<String, Value>) -> DomainResult<Row> {
        self.faults.before_call("merge").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let old = self.find_row(conn, id)?
            .ok_or_else(|| DomainError::NotFound(format!("Row {} not found", id)))?;
        let mut new = old.clone();
        new.merge(patch);
        self.write_row(conn, &mut new)?;

        self.feed.publish(RowChange::updated(old, new.clone()));
        Ok(new)
    }

    fn find_row(&self, conn: &Connection, id: i64) -> DomainResult<Option<Row>> {
        let row = conn
            .query_row(
                "SELECT id, table_name, user_id, data, created_at, updated_at FROM rows \
                 WHERE id = ? AND table_name = ? AND user_id = ?",
                params![id, self.table, self.user_id],
                raw_row,
            )
            .optional()?;
        row.map(RawRow::into_row).transpose()
    }

    fn list_rows(&self, conn: &Connection) -> DomainResult<Vec<Row>> {
        let mut stmt = conn.prepare(
            "SELECT id, table_name, user_id, data, created_at, updated_at FROM rows \
             WHERE table_name = ? AND user_id = ? ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![self.table, self.user_id], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRow::into_row).collect()
    }

    fn write_row(&self, conn: &Connection, row: &mut Row) -> DomainResult<()> {
        row.updated_at = chrono::Utc::now().timestamp_millis();
        let data = serde_json::to_string(&row.data)?;
        conn.execute(
            "UPDATE rows SET data = ?, updated_at = ? WHERE id = ?",
            params![data, row.updated_at, row.id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Repository<Row> for TableRepository {
    async fn create(&self, entity: &Row) -> DomainResult<Row> {
        self.faults.before_call("create").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let now = chrono::Utc::now().timestamp_millis();
        let mut row = Row::new(self.table.clone(), self.user_id.clone(), entity.data.clone());
        row.data.remove("id");
        row.created_at = now;
        row.updated_at = now;

        conn.execute(
            "INSERT INTO rows (table_name, user_id, data, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                row.table,
                row.user_id,
                serde_json::to_string(&row.data)?,
                row.created_at,
                row.updated_at
            ],
        )?;
        row.id = conn.last_insert_rowid();

        self.feed.publish(RowChange::inserted(row.clone()));
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<Row>> {
        self.faults.before_call("find_by_id").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;
        self.find_row(conn, id)
    }

    async fn list(&self) -> DomainResult<Vec<Row>> {
        self.faults.before_call("list").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;
        self.list_rows(conn)
    }

    async fn update(&self, entity: &Row) -> DomainResult<Row> {
        self.faults.before_call("update").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let old = self.find_row(conn, entity.id)?
            .ok_or_else(|| DomainError::NotFound(format!("Row {} not found", entity.id)))?;
        let mut new = old.clone();
        new.data = entity.data.clone();
        new.data.remove("id");
        self.write_row(conn, &mut new)?;

        self.feed.publish(RowChange::updated(old, new.clone()));
        Ok(new)
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        self.faults.before_call("delete").await?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let old = self.find_row(conn, id)?
            .ok_or_else(|| DomainError::NotFound(format!("Row {} not found", id)))?;
        conn.execute("DELETE FROM rows WHERE id = ?", params![id])?;

        self.feed.publish(RowChange::deleted(old));
        Ok(())
    }
}

fn not_initialized() -> DomainError {
    DomainError::Internal("Database not initialized".to_string())
}

/// Column values as read, before the JSON payload is parsed
struct RawRow {
    id: i64,
    table: String,
    user_id: String,
    data: String,
    created_at: i64,
    updated_at: i64,
}

impl RawRow {
    fn into_row(self) -> DomainResult<Row> {
        let data: Map<String, Value> = serde_json::from_str(&self.data).map_err(|e| {
            DomainError::Internal(format!("Row {} has malformed data: {}", self.id, e))
        })?;
        Ok(Row {
            id: self.id,
            table: self.table,
            user_id: self.user_id,
            data,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        table: row.get(1)?,
        user_id: row.get(2)?,
        data: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
