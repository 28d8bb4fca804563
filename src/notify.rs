//! Transient notifications
//!
//! Success and error toasts emitted when a mutation resolves. Optionally every
//! notification is also kept as a record in a history store (the dashboard's
//! "notifications" collection), so the two stay consistent.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Draft, MutationId};
use crate::store::Store;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub mutation: Option<MutationId>,
    /// Milliseconds since epoch
    pub created_at: i64,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    history: Option<History>,
}

#[derive(Clone)]
struct History {
    store: Store,
    limit: usize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, history: None }
    }

    /// Also append every notification to `store` as `{text, level, read}`,
    /// keeping at most the newest `limit`
    pub fn with_history(mut self, store: Store, limit: usize) -> Self {
        self.history = Some(History { store, limit });
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, mutation: Option<MutationId>, message: impl Into<String>) {
        self.emit(Level::Success, mutation, message.into());
    }

    pub fn info(&self, mutation: Option<MutationId>, message: impl Into<String>) {
        self.emit(Level::Info, mutation, message.into());
    }

    pub fn error(&self, mutation: Option<MutationId>, message: impl Into<String>) {
        self.emit(Level::Error, mutation, message.into());
    }

    fn emit(&self, level: Level, mutation: Option<MutationId>, message: String) {
        match level {
            Level::Error => tracing::warn!(mutation = ?mutation, "{}", message),
            _ => tracing::info!(mutation = ?mutation, "{}", message),
        }

        if let Some(History { store, limit }) = &self.history {
            let schema = store.schema();
            let draft = Draft::new()
                .with(schema.text_field.clone(), message.clone())
                .with("level", level.as_str())
                .with(schema.status_field.clone(), false);
            match store.add(draft) {
                Ok(_) => {
                    store.retain_last(*limit);
                }
                Err(e) => tracing::debug!("notification not kept in history: {}", e),
            }
        }

        let notification = Notification {
            level,
            message,
            mutation,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        // Nobody listening is fine; toasts are transient
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordSchema;

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let mutation = MutationId::new();

        notifier.error(Some(mutation), "Could not save ticket");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.level, Level::Error);
        assert_eq!(received.message, "Could not save ticket");
        assert_eq!(received.mutation, Some(mutation));
    }

    #[test]
    fn test_history_store_keeps_notifications() {
        let history = Store::new("notifications", RecordSchema::new("message", "read"));
        let notifier = Notifier::new().with_history(history.clone(), 10);

        notifier.success(None, "Trip saved");
        notifier.error(None, "Offline");

        let records = history.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("message"), Some("Trip saved"));
        assert_eq!(records[1].text("level"), Some("error"));
        assert!(!records[1].flag("read"));
    }

    #[test]
    fn test_history_is_capped_to_newest() {
        let history = Store::new("notifications", RecordSchema::new("message", "read"));
        let notifier = Notifier::new().with_history(history.clone(), 3);

        for i in 0..5 {
            notifier.info(None, format!("note {}", i));
        }

        let messages: Vec<_> = history
            .records()
            .iter()
            .filter_map(|r| r.text("message").map(str::to_string))
            .collect();
        assert_eq!(messages, vec!["note 2", "note 3", "note 4"]);
    }
}
