//! Client Models
//!
//! Records, identifiers and the shape rules new records must satisfy.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;

/// Free-form record columns
pub type Fields = Map<String, Value>;

const TEMPORARY_PREFIX: &str = "tmp-";

/// Record identifier
///
/// Temporary identifiers carry a `tmp-` prefix; permanent ones (generated or
/// server-assigned) never do, so the two can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh permanent identifier (random 128-bit)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Fresh identifier for a record the server has not confirmed yet
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMPORARY_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

// Older saved collections used numeric (timestamp) ids
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => RecordId(id),
            RawId::Number(id) => RecordId(id.to_string()),
        })
    }
}

/// Correlates one optimistic mutation with its remote call and notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted domain entity (todo, ticket, trip activity, ...)
///
/// Serialized flat: `{"id": "...", "text": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, fields: Fields) -> Self {
        let mut fields = fields;
        fields.remove("id");
        Self { id: id.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Boolean column; anything but `true` reads as false
    pub fn flag(&self, field: &str) -> bool {
        self.fields.get(field).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        if field == "id" {
            return;
        }
        self.fields.insert(field, value.into());
    }

    /// Merge a patch; never touches `id`
    pub fn merge(&mut self, patch: &Patch) {
        for (field, value) in patch.iter() {
            self.fields.insert(field.clone(), value.clone());
        }
    }
}

/// Columns of a record that has no identifier yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Draft(Fields);

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        if field != "id" {
            self.0.insert(field, value.into());
        }
        self
    }

    pub fn from_fields(mut fields: Fields) -> Self {
        fields.remove("id");
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }

    pub fn into_fields(self) -> Fields {
        self.0
    }
}

/// Columns to merge into an existing record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Fields);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        if field != "id" {
            self.0.insert(field, value.into());
        }
        self
    }

    pub fn from_fields(mut fields: Fields) -> Self {
        fields.remove("id");
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }
}

/// Local shape rules for a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Required, non-blank text column
    pub text_field: String,
    /// Boolean status column, defaulted to `false` on creation
    pub status_field: String,
    /// Stamp `created_at` (ms since epoch) on creation
    pub stamp_created_at: bool,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self {
            text_field: "text".to_string(),
            status_field: "completed".to_string(),
            stamp_created_at: true,
        }
    }
}

impl RecordSchema {
    pub fn new(text_field: impl Into<String>, status_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
            status_field: status_field.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self, draft: &Draft) -> Result<(), StoreError> {
        self.check_text(draft.get(&self.text_field), true)
    }

    /// A patch may leave the text column alone, but may not blank it
    pub fn validate_patch(&self, patch: &Patch) -> Result<(), StoreError> {
        self.check_text(patch.get(&self.text_field), false)
    }

    /// Fill in defaults for a validated draft
    pub fn complete(&self, draft: Draft) -> Fields {
        let mut fields = draft.into_fields();
        if let Some(Value::String(text)) = fields.get_mut(&self.text_field) {
            let trimmed = text.trim();
            if trimmed.len() != text.len() {
                *text = trimmed.to_string();
            }
        }
        fields.entry(self.status_field.clone()).or_insert(Value::Bool(false));
        if self.stamp_created_at {
            fields
                .entry("created_at".to_string())
                .or_insert_with(|| Value::from(chrono::Utc::now().timestamp_millis()));
        }
        fields
    }

    fn check_text(&self, value: Option<&Value>, required: bool) -> Result<(), StoreError> {
        match value {
            None if required => Err(StoreError::MissingField(self.text_field.clone())),
            None => Ok(()),
            Some(Value::String(text)) if text.trim().is_empty() => {
                Err(StoreError::MissingField(self.text_field.clone()))
            }
            Some(Value::String(_)) => Ok(()),
            Some(_) => Err(StoreError::NotText(self.text_field.clone())),
        }
    }
}
