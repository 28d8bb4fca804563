//! Remote table adapter
//!
//! One outbound request per mutation. `BackendTable` talks to the table
//! service for one `(table, user)` pair; row ids become record ids.

use std::sync::Arc;

use async_trait::async_trait;
use tidy_sync_backend::{
    ChangeKind, ChangeReceiver, FeedItem, Repository, Row, RowChange, TableRepository,
};

use crate::error::PersistError;
use crate::models::{Fields, MutationId, Patch, Record, RecordId};
use crate::realtime::{ChangeEvent, ChangeSource, ChangeStream, EventType, StreamItem};
use crate::store::Store;

/// A user-scoped remote table
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Authoritative rows, in table order
    async fn select(&self) -> Result<Vec<Record>, PersistError>;

    /// Insert; the returned record carries the permanent id
    async fn insert(&self, mutation: MutationId, fields: Fields) -> Result<Record, PersistError>;

    async fn update(
        &self,
        mutation: MutationId,
        id: &RecordId,
        patch: &Patch,
    ) -> Result<Record, PersistError>;

    async fn delete(&self, mutation: MutationId, id: &RecordId) -> Result<(), PersistError>;

    /// Real-time channel for this table
    fn subscribe(&self) -> ChangeStream;
}

/// `RemoteTable` over the table service
#[derive(Clone)]
pub struct BackendTable {
    repo: TableRepository,
}

impl BackendTable {
    pub fn new(repo: TableRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &TableRepository {
        &self.repo
    }

    fn row_id(id: &RecordId) -> Result<i64, PersistError> {
        id.as_str().parse().map_err(|_| PersistError::UnknownRecord(id.clone()))
    }
}

fn row_to_record(row: Row) -> Record {
    Record::new(RecordId::from(row.id), row.data)
}

#[async_trait]
impl RemoteTable for BackendTable {
    async fn select(&self) -> Result<Vec<Record>, PersistError> {
        let rows = self.repo.list().await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn insert(&self, mutation: MutationId, fields: Fields) -> Result<Record, PersistError> {
        tracing::debug!(table = %self.repo.table(), %mutation, "insert");
        let row = Row::new(self.repo.table(), self.repo.user_id(), fields);
        let saved = self.repo.create(&row).await?;
        Ok(row_to_record(saved))
    }

    async fn update(
        &self,
        mutation: MutationId,
        id: &RecordId,
        patch: &Patch,
    ) -> Result<Record, PersistError> {
        tracing::debug!(table = %self.repo.table(), %mutation, %id, "update");
        let saved = self.repo.merge(Self::row_id(id)?, patch.fields()).await?;
        Ok(row_to_record(saved))
    }

    async fn delete(&self, mutation: MutationId, id: &RecordId) -> Result<(), PersistError> {
        tracing::debug!(table = %self.repo.table(), %mutation, %id, "delete");
        self.repo.delete(Self::row_id(id)?).await?;
        Ok(())
    }

    fn subscribe(&self) -> ChangeStream {
        Box::new(BackendChanges { rx: self.repo.subscribe() })
    }
}

struct BackendChanges {
    rx: ChangeReceiver,
}

fn to_event(change: RowChange) -> ChangeEvent {
    ChangeEvent {
        event_type: match change.event_type {
            ChangeKind::Insert => EventType::Insert,
            ChangeKind::Update => EventType::Update,
            ChangeKind::Delete => EventType::Delete,
        },
        new: change.new.map(row_to_record),
        old: change.old.map(row_to_record),
    }
}

#[async_trait]
impl ChangeSource for BackendChanges {
    async fn next_item(&mut self) -> Option<StreamItem> {
        Some(match self.rx.recv().await? {
            FeedItem::Change(change) => StreamItem::Event(to_event(change)),
            FeedItem::Lagged(skipped) => StreamItem::Lagged(skipped),
        })
    }
}

/// Initial load and manual cache invalidation for a remote-backed store
#[derive(Clone)]
pub struct RemoteAdapter {
    table: Arc<dyn RemoteTable>,
}

impl RemoteAdapter {
    pub fn new(table: Arc<dyn RemoteTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> Arc<dyn RemoteTable> {
        self.table.clone()
    }

    /// Replace the store's collection with the remote rows
    pub async fn refresh(&self, store: &Store) -> Result<usize, PersistError> {
        let records = self.table.select().await?;
        let count = records.len();
        store.replace_all(records);
        tracing::info!(store = %store.name(), count, "refreshed from remote");
        Ok(count)
    }

    /// Initial load; a failure leaves the store as it was
    pub async fn load_into(&self, store: &Store) -> bool {
        match self.refresh(store).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(store = %store.name(), "initial remote load failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Draft, RecordSchema};
    use serde_json::json;
    use std::path::Path;
    use tidy_sync_backend::TableService;

    async fn table() -> (TableService, BackendTable) {
        let service = TableService::open(Path::new(":memory:")).await.unwrap();
        let table = BackendTable::new(service.table("tickets", "alice"));
        (service, table)
    }

    #[tokio::test]
    async fn test_insert_assigns_permanent_id() {
        let (_service, table) = table().await;
        let saved = table
            .insert(MutationId::new(), Draft::new().with("text", "Printer jam").into_fields())
            .await
            .unwrap();

        assert!(!saved.id.is_temporary());
        assert_eq!(saved.text("text"), Some("Printer jam"));
    }

    #[tokio::test]
    async fn test_temporary_ids_are_unknown_remotely() {
        let (_service, table) = table().await;
        let err = table.delete(MutationId::new(), &RecordId::temporary()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let (_service, table) = table().await;
        let saved = table
            .insert(MutationId::new(), Draft::new().with("text", "a").with("status", "open").into_fields())
            .await
            .unwrap();

        let updated = table
            .update(MutationId::new(), &saved.id, &Patch::new().set("status", "closed"))
            .await
            .unwrap();
        assert_eq!(updated.get("status"), Some(&json!("closed")));
        assert_eq!(updated.text("text"), Some("a"));
    }

    #[tokio::test]
    async fn test_subscribe_translates_row_changes() {
        let (_service, table) = table().await;
        let mut stream = table.subscribe();

        let saved = table
            .insert(MutationId::new(), Draft::new().with("text", "a").into_fields())
            .await
            .unwrap();
        let event = match stream.next_item().await {
            Some(StreamItem::Event(event)) => event,
            other => panic!("expected an event, got {:?}", other),
        };
        assert_eq!(event.event_type, EventType::Insert);
        assert_eq!(event.new.unwrap().id, saved.id);
    }

    #[tokio::test]
    async fn test_refresh_replaces_collection() {
        let (_service, table) = table().await;
        table.insert(MutationId::new(), Draft::new().with("text", "remote").into_fields()).await.unwrap();

        let store = Store::new("tickets", RecordSchema::default());
        store.add(Draft::new().with("text", "stale")).unwrap();

        let adapter = RemoteAdapter::new(Arc::new(table));
        assert_eq!(adapter.refresh(&store).await.unwrap(), 1);
        assert_eq!(store.records()[0].text("text"), Some("remote"));
    }
}
