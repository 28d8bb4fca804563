//! Client Configuration
//!
//! Stored as JSON next to the local data (`tidy_sync.json`), the same way the
//! sync settings file sits beside the database.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::RecordSchema;

pub const CONFIG_FILE_NAME: &str = "tidy_sync.json";

/// Where a store's collection lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local durable key only
    #[default]
    Local,
    /// Remote table with real-time updates
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    /// Local storage key, or remote table name; defaults to `name`
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_status_field")]
    pub status_field: String,
    #[serde(default)]
    pub backend: StoreBackend,
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_status_field() -> String {
    "completed".to_string()
}

impl StoreConfig {
    pub fn new(name: &str, backend: StoreBackend) -> Self {
        Self {
            name: name.to_string(),
            key: None,
            text_field: default_text_field(),
            status_field: default_status_field(),
            backend,
        }
    }

    pub fn with_fields(mut self, text_field: &str, status_field: &str) -> Self {
        self.text_field = text_field.to_string();
        self.status_field = status_field.to_string();
        self
    }

    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    pub fn schema(&self) -> RecordSchema {
        RecordSchema::new(self.text_field.clone(), self.status_field.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Table service database (":memory:" for an ephemeral one)
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub storage_dir: PathBuf,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default = "default_stores")]
    pub stores: Vec<StoreConfig>,
    /// Store that keeps a history of notifications, if any
    #[serde(default)]
    pub notification_store: Option<String>,
    /// Newest notifications kept in that store; older ones are dropped
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_user() -> String {
    "local".to_string()
}

/// The travel dashboard's four cooperating stores
fn default_stores() -> Vec<StoreConfig> {
    vec![
        StoreConfig::new("items", StoreBackend::Local),
        StoreConfig::new("notifications", StoreBackend::Local).with_fields("message", "read"),
        StoreConfig::new("settings", StoreBackend::Local).with_fields("name", "enabled"),
        StoreConfig::new("itinerary", StoreBackend::Remote).with_fields("activity", "completed"),
    ]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data"),
            log_dir: None,
            user_id: default_user(),
            remote: None,
            stores: default_stores(),
            notification_store: Some("notifications".to_string()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Defaults rooted at `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            storage_dir: dir.join("storage"),
            log_dir: Some(dir.join("logs")),
            ..Self::default()
        }
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Read the config; missing or unreadable files give `None`
pub fn load_config(path: &Path) -> Option<ClientConfig> {
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(ConfigError::from)
        .and_then(|raw| Ok(serde_json::from_str::<ClientConfig>(&raw)?));
    match parsed {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring config: {}", e);
            None
        }
    }
}

pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        let mut config = ClientConfig::in_dir(dir.path());
        config.user_id = "alice".to_string();
        config.remote = Some(RemoteConfig { database_path: dir.path().join("service.db") });

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path), Some(config));
    }

    #[test]
    fn test_missing_or_corrupt_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        assert_eq!(load_config(&path), None);

        fs::write(&path, "{oops").unwrap();
        assert_eq!(load_config(&path), None);
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"storage_dir": "/tmp/x"}"#).unwrap();
        assert_eq!(config.user_id, "local");
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.stores.len(), 4);
        assert_eq!(config.store("itinerary").unwrap().backend, StoreBackend::Remote);

        let store: StoreConfig = serde_json::from_str(r#"{"name": "tickets", "key": "ticket_log"}"#).unwrap();
        assert_eq!(store.key(), "ticket_log");
        assert_eq!(store.text_field, "text");
        assert_eq!(store.backend, StoreBackend::Local);
    }
}
