//! Row Entity
//!
//! One stored record: a free-form JSON object owned by a user and filed under
//! a table name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::Entity;

/// A row of a user-scoped table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Server-assigned identifier (0 until inserted)
    pub id: i64,
    /// Logical table name (e.g. "tickets", "itinerary")
    pub table: String,
    /// Owning identity
    pub user_id: String,
    /// Column values
    pub data: Map<String, Value>,
    /// Milliseconds since epoch
    pub created_at: i64,
    pub updated_at: i64,
}

impl Row {
    /// A row that has not been inserted yet
    pub fn new(
        table: impl Into<String>,
        user_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            id: 0,
            table: table.into(),
            user_id: user_id.into(),
            data,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Merge `patch` into the row's columns; `id` keys are ignored
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }
}

impl Entity for Row {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_row_creation() {
        let row = Row::new("todos", "alice", columns(json!({"text": "Buy milk"})));
        assert_eq!(row.id(), 0);
        assert_eq!(row.get("text"), Some(&json!("Buy milk")));
    }

    #[test]
    fn test_merge_ignores_id() {
        let mut row = Row::new("todos", "alice", columns(json!({"text": "a", "completed": false})));
        row.merge(&columns(json!({"id": 99, "completed": true})));
        assert_eq!(row.get("completed"), Some(&json!(true)));
        assert_eq!(row.get("text"), Some(&json!("a")));
        assert!(row.get("id").is_none());
    }
}
