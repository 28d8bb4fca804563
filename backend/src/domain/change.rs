//! Row change events published by the table service

use serde::{Deserialize, Serialize};

use super::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A committed change to one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub table: String,
    pub user_id: String,
    /// Row after the change (absent for deletes)
    pub new: Option<Row>,
    /// Row before the change (absent for inserts)
    pub old: Option<Row>,
}

impl RowChange {
    pub fn inserted(row: Row) -> Self {
        Self {
            event_type: ChangeKind::Insert,
            table: row.table.clone(),
            user_id: row.user_id.clone(),
            new: Some(row),
            old: None,
        }
    }

    pub fn updated(old: Row, new: Row) -> Self {
        Self {
            event_type: ChangeKind::Update,
            table: new.table.clone(),
            user_id: new.user_id.clone(),
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn deleted(old: Row) -> Self {
        Self {
            event_type: ChangeKind::Delete,
            table: old.table.clone(),
            user_id: old.user_id.clone(),
            new: None,
            old: Some(old),
        }
    }
}
