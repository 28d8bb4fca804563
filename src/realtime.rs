//! Real-time channel
//!
//! Externally-originated inserts, updates and deletes are pushed into a store
//! through the same methods local mutations use. Events can race with an
//! in-flight optimistic mutation; the store's upsert/rekey rules keep ids
//! unique and the later confirmation wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::Record;
use crate::persistence::RemoteAdapter;
use crate::store::Store;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// `{eventType, new, old}` as delivered by the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(default)]
    pub new: Option<Record>,
    #[serde(default)]
    pub old: Option<Record>,
}

impl ChangeEvent {
    pub fn insert(record: Record) -> Self {
        Self { event_type: EventType::Insert, new: Some(record), old: None }
    }

    pub fn update(old: Option<Record>, new: Record) -> Self {
        Self { event_type: EventType::Update, new: Some(new), old }
    }

    pub fn delete(old: Record) -> Self {
        Self { event_type: EventType::Delete, new: None, old: Some(old) }
    }
}

/// One item from a change source
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(ChangeEvent),
    /// Events were dropped before delivery; the store may be stale
    Lagged(u64),
}

/// Source of change events; `None` means the channel closed
#[async_trait]
pub trait ChangeSource: Send {
    async fn next_item(&mut self) -> Option<StreamItem>;
}

pub type ChangeStream = Box<dyn ChangeSource>;

#[async_trait]
impl ChangeSource for mpsc::Receiver<ChangeEvent> {
    async fn next_item(&mut self) -> Option<StreamItem> {
        self.recv().await.map(StreamItem::Event)
    }
}

/// Applies change events to a store
pub struct RealtimeBridge;

impl RealtimeBridge {
    /// Spawn a task feeding `stream` into `store` until the stream closes
    /// or the returned subscription is dropped. Lag markers are logged only.
    pub fn attach(store: &Store, stream: ChangeStream) -> Subscription {
        Self::spawn(store, stream, None)
    }

    /// Like [`attach`](Self::attach), but reloads the store from `adapter`
    /// whenever the stream reports dropped events
    pub fn attach_with_resync(
        store: &Store,
        stream: ChangeStream,
        adapter: RemoteAdapter,
    ) -> Subscription {
        Self::spawn(store, stream, Some(adapter))
    }

    fn spawn(
        store: &Store,
        mut stream: ChangeStream,
        resync: Option<RemoteAdapter>,
    ) -> Subscription {
        let store = store.clone();
        let label = format!("realtime:{}", store.name());
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next_item().await {
                match item {
                    StreamItem::Event(event) => {
                        Self::apply(&store, event);
                    }
                    StreamItem::Lagged(skipped) => {
                        Self::lagged(&store, skipped, resync.as_ref()).await;
                    }
                }
            }
            tracing::info!(store = %store.name(), "change feed closed");
        });
        Subscription::new(label, handle)
    }

    async fn lagged(store: &Store, skipped: u64, resync: Option<&RemoteAdapter>) {
        let Some(adapter) = resync else {
            tracing::warn!(store = %store.name(), skipped, "change feed lagged, events lost");
            return;
        };
        tracing::warn!(store = %store.name(), skipped, "change feed lagged, reloading");
        if let Err(e) = adapter.refresh(store).await {
            tracing::warn!(store = %store.name(), "reload after lag failed: {}", e);
        }
    }

    /// Apply one event; returns `false` for events that could not be applied
    pub fn apply(store: &Store, event: ChangeEvent) -> bool {
        match event.event_type {
            EventType::Insert => match event.new {
                Some(record) => {
                    tracing::debug!(store = %store.name(), id = %record.id, "remote insert");
                    store.insert(record);
                    true
                }
                None => Self::malformed(store, "insert without new record"),
            },
            EventType::Update => match event.new {
                Some(record) => {
                    tracing::debug!(store = %store.name(), id = %record.id, "remote update");
                    if store.replace(record.clone()).is_none() {
                        store.insert(record);
                    }
                    true
                }
                None => Self::malformed(store, "update without new record"),
            },
            EventType::Delete => match event.old.or(event.new) {
                Some(record) => {
                    tracing::debug!(store = %store.name(), id = %record.id, "remote delete");
                    store.remove(&record.id);
                    true
                }
                None => Self::malformed(store, "delete without record"),
            },
        }
    }

    fn malformed(store: &Store, reason: &str) -> bool {
        tracing::warn!(store = %store.name(), "skipping malformed change event: {}", reason);
        false
    }
}
