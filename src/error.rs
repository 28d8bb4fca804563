//! Client error types

use std::io;

use thiserror::Error;
use tidy_sync_backend::DomainError;

use crate::models::RecordId;

/// Local shape validation failures; the collection is never touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("`{0}` is required")]
    MissingField(String),
    #[error("`{0}` must be text")]
    NotText(String),
}

/// Durable medium and remote call failures
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed stored data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("remote call failed: {0}")]
    Remote(#[from] DomainError),
    #[error("record {0} is not known to the remote table")]
    UnknownRecord(RecordId),
    #[error("no store named `{0}`")]
    UnknownStore(String),
}

impl PersistError {
    /// The remote side says the record is already gone
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PersistError::Remote(DomainError::NotFound(_)) | PersistError::UnknownRecord(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
