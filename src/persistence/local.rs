//! Local durable medium
//!
//! A directory-backed key/value store, one JSON file per key. Collections are
//! stored as a JSON array of flat record objects. Loading is best-effort: a
//! missing, unreadable or corrupt value yields an empty collection.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::PersistError;
use crate::models::Record;
use crate::store::Store;
use crate::subscription::Subscription;

/// Named-key durable storage
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a uniquely named temporary file and rename, so readers never
    /// see half a value and concurrent writers never share a scratch file
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Stored keys (as file stems), sorted
    pub fn keys(&self) -> Result<Vec<String>, PersistError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys become file names; anything outside [A-Za-z0-9_-] becomes '_'
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// One collection mirrored under one key
#[derive(Debug, Clone)]
pub struct LocalPersistence {
    storage: LocalStorage,
    key: String,
}

impl LocalPersistence {
    pub fn new(storage: LocalStorage, key: impl Into<String>) -> Self {
        Self { storage, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Strict read: `Ok(None)` if the key was never written
    pub fn try_load(&self) -> Result<Option<Vec<Record>>, PersistError> {
        let Some(raw) = self.storage.get_item(&self.key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Best-effort read; never fails app startup
    pub fn load(&self) -> Vec<Record> {
        match self.try_load() {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, "discarding unreadable saved collection: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, records: &[Record]) -> Result<(), PersistError> {
        let raw = serde_json::to_string(records)?;
        self.storage.set_item(&self.key, &raw)
    }

    /// Write the store's current collection now
    pub fn flush(&self, store: &Store) -> Result<(), PersistError> {
        self.save(&store.records())
    }

    /// Load into `store`, then keep the medium in step with every change
    pub fn attach(&self, store: &Store) -> Subscription {
        let loaded = self.load();
        tracing::info!(
            store = %store.name(),
            key = %self.key,
            count = loaded.len(),
            "loaded local collection"
        );
        store.replace_all(loaded);

        let mut changes = store.changes();
        changes.borrow_and_update();

        let store = store.clone();
        let persistence = self.clone();
        let handle = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                changes.borrow_and_update();
                if let Err(e) = persistence.flush(&store) {
                    tracing::warn!(key = %persistence.key, "failed to save collection: {}", e);
                }
            }
        });
        Subscription::new(format!("local:{}", self.key), handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Draft, Patch, RecordSchema};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::open(dir.path().join("storage")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_storage_round_trip() {
        let (_dir, storage) = setup();
        assert_eq!(storage.get_item("items").unwrap(), None);

        storage.set_item("items", "[]").unwrap();
        assert_eq!(storage.get_item("items").unwrap().as_deref(), Some("[]"));
        assert_eq!(storage.keys().unwrap(), vec!["items".to_string()]);

        storage.remove_item("items").unwrap();
        storage.remove_item("items").unwrap();
        assert_eq!(storage.get_item("items").unwrap(), None);
    }

    #[test]
    fn test_keys_are_sanitized() {
        let (_dir, storage) = setup();
        storage.set_item("../escape/me", "x").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["___escape_me".to_string()]);
    }

    #[test]
    fn test_collection_round_trip() {
        let (_dir, storage) = setup();
        let persistence = LocalPersistence::new(storage, "checklist");
        let store = Store::new("checklist", RecordSchema::default());
        store.add(Draft::new().with("text", "Passport").with("category", "documents")).unwrap();
        store.add(Draft::new().with("text", "Charger")).unwrap();

        persistence.flush(&store).unwrap();
        assert_eq!(persistence.load(), store.records());
    }

    #[test]
    fn test_corrupt_value_loads_empty() {
        let (_dir, storage) = setup();
        storage.set_item("expenses", "{not json").unwrap();
        let persistence = LocalPersistence::new(storage, "expenses");

        assert!(persistence.try_load().is_err());
        assert!(persistence.load().is_empty());
    }

    #[tokio::test]
    async fn test_attach_loads_and_writes_changes() {
        let (_dir, storage) = setup();
        let persistence = LocalPersistence::new(storage, "items");
        let seed = Store::new("seed", RecordSchema::default());
        seed.add(Draft::new().with("text", "from disk")).unwrap();
        persistence.flush(&seed).unwrap();

        let store = Store::new("items", RecordSchema::default());
        let subscription = persistence.attach(&store);
        assert_eq!(store.records(), seed.records());

        let added = store.add(Draft::new().with("text", "new")).unwrap();
        store.update(&added.id, &Patch::new().set("completed", true));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let saved = persistence.load();
        assert_eq!(saved.len(), 2);
        assert!(saved[1].flag("completed"));
        drop(subscription);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flushes_of_one_key() {
        let (_dir, storage) = setup();
        let store = Store::new("groceries", RecordSchema::default());
        for item in ["Milk", "Eggs", "Bread"] {
            store.add(Draft::new().with("text", item)).unwrap();
        }

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let persistence = LocalPersistence::new(storage.clone(), "groceries");
                let store = store.clone();
                tokio::task::spawn_blocking(move || {
                    (0..50).map(|_| persistence.flush(&store)).collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        for writer in writers {
            assert!(writer.await.unwrap().is_ok());
        }

        let reloaded = LocalPersistence::new(storage.clone(), "groceries");
        assert_eq!(reloaded.try_load().unwrap(), Some(store.records()));
        assert_eq!(storage.keys().unwrap(), vec!["groceries".to_string()]);
    }
}
