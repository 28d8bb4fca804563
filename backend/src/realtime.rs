//! Real-time change feed
//!
//! Fans committed row changes out to subscribers. Each subscriber only sees
//! changes for the table and user it subscribed to.

use tokio::sync::broadcast;

use crate::domain::RowChange;

const FEED_CAPACITY: usize = 256;

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Change(RowChange),
    /// The subscriber fell behind and `n` feed entries were dropped; those
    /// may include changes it should have seen
    Lagged(u64),
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<RowChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a committed change; having no subscribers is fine
    pub fn publish(&self, change: RowChange) {
        log::debug!(
            "feed {} {}/{} ({} subscribers)",
            change.event_type.as_str(),
            change.table,
            change.user_id,
            self.tx.receiver_count()
        );
        let _ = self.tx.send(change);
    }

    pub fn subscribe(
        &self,
        table: impl Into<String>,
        user_id: impl Into<String>,
    ) -> ChangeReceiver {
        ChangeReceiver {
            rx: self.tx.subscribe(),
            table: table.into(),
            user_id: user_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A filtered subscription to the feed
pub struct ChangeReceiver {
    rx: broadcast::Receiver<RowChange>,
    table: String,
    user_id: String,
}

impl ChangeReceiver {
    /// Next matching change, or a lag marker; `None` once the feed is gone
    pub async fn recv(&mut self) -> Option<FeedItem> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if change.table == self.table && change.user_id == self.user_id {
                        return Some(FeedItem::Change(change));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "Subscriber for {}/{} lagged, {} changes skipped",
                        self.table,
                        self.user_id,
                        skipped
                    );
                    return Some(FeedItem::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching change, ignoring lag markers
    pub async fn recv_change(&mut self) -> Option<RowChange> {
        loop {
            match self.recv().await? {
                FeedItem::Change(change) => return Some(change),
                FeedItem::Lagged(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeKind, Row};
    use serde_json::Map;

    #[tokio::test]
    async fn test_subscriber_only_sees_its_table_and_user() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe("todos", "alice");

        feed.publish(RowChange::inserted(Row::new("tickets", "alice", Map::new())));
        feed.publish(RowChange::inserted(Row::new("todos", "bob", Map::new())));
        let mut mine = Row::new("todos", "alice", Map::new());
        mine.id = 7;
        feed.publish(RowChange::deleted(mine));

        let change = rx.recv_change().await.unwrap();
        assert_eq!(change.event_type, ChangeKind::Delete);
        assert_eq!(change.old.unwrap().id, 7);
    }

    #[tokio::test]
    async fn test_recv_ends_when_feed_dropped() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe("todos", "alice");
        drop(feed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_lag_marker() {
        let feed = ChangeFeed::with_capacity(2);
        let mut rx = feed.subscribe("todos", "alice");

        for id in 1..=5 {
            let mut row = Row::new("todos", "alice", Map::new());
            row.id = id;
            feed.publish(RowChange::inserted(row));
        }

        assert_eq!(rx.recv().await, Some(FeedItem::Lagged(3)));
        match rx.recv().await {
            Some(FeedItem::Change(change)) => assert_eq!(change.new.unwrap().id, 4),
            other => panic!("expected a change, got {:?}", other),
        }
    }
}
