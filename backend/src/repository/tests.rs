//! Repository Integration Tests
//!
//! Tests for TableRepository with an in-memory SQLite database.

#[cfg(test)]
mod tests {
    use crate::domain::{ChangeKind, DomainError, Row};
    use crate::realtime::ChangeFeed;
    use crate::repository::{init_db, Repository, TableRepository};
    use serde_json::{json, Map, Value};
    use std::path::PathBuf;

    fn columns(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn setup_test_db() -> (TableRepository, ChangeFeed) {
        let db_path = PathBuf::from(":memory:");
        let db_state = init_db(&db_path).await.expect("Failed to init test DB");
        let feed = ChangeFeed::new();
        let repo = TableRepository::new(db_state.connection(), "todos", "alice", feed.clone());
        (repo, feed)
    }

    #[tokio::test]
    async fn test_create_row() {
        let (repo, _) = setup_test_db().await;

        let row = Row::new("ignored", "ignored", columns(json!({"text": "Buy milk", "completed": false})));
        let created = repo.create(&row).await.expect("Failed to create");

        assert!(created.id > 0);
        assert_eq!(created.table, "todos");
        assert_eq!(created.user_id, "alice");
        assert_eq!(created.get("text"), Some(&json!("Buy milk")));
        assert!(created.created_at > 0);
    }

    #[tokio::test]
    async fn test_client_id_column_is_dropped() {
        let (repo, _) = setup_test_db().await;

        let row = Row::new("todos", "alice", columns(json!({"id": "tmp-1", "text": "a"})));
        let created = repo.create(&row).await.unwrap();

        assert!(created.get("id").is_none());
    }

    #[tokio::test]
    async fn test_find_by_id_is_scoped_to_user() {
        let (repo, feed) = setup_test_db().await;
        let created = repo.create(&Row::new("todos", "alice", columns(json!({"text": "mine"})))).await.unwrap();

        let found = repo.find_by_id(created.id).await.expect("Find failed");
        assert_eq!(found.unwrap().get("text"), Some(&json!("mine")));

        let other = repo.for_user("bob");
        assert!(other.find_by_id(created.id).await.unwrap().is_none());
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_list_rows_in_insert_order() {
        let (repo, _) = setup_test_db().await;

        repo.create(&Row::new("todos", "alice", columns(json!({"text": "1"})))).await.unwrap();
        repo.create(&Row::new("todos", "alice", columns(json!({"text": "2"})))).await.unwrap();

        let rows = repo.list().await.expect("List failed");
        let texts: Vec<_> = rows.iter().map(|r| r.get("text").cloned().unwrap()).collect();
        assert_eq!(texts, vec![json!("1"), json!("2")]);
    }

    #[tokio::test]
    async fn test_merge_publishes_update() {
        let (repo, _) = setup_test_db().await;
        let created = repo.create(&Row::new("todos", "alice", columns(json!({"text": "a", "completed": false})))).await.unwrap();
        let mut rx = repo.subscribe();

        let merged = repo.merge(created.id, &columns(json!({"completed": true}))).await.expect("Merge failed");
        assert_eq!(merged.get("completed"), Some(&json!(true)));
        assert_eq!(merged.get("text"), Some(&json!("a")));

        let change = rx.recv_change().await.unwrap();
        assert_eq!(change.event_type, ChangeKind::Update);
        assert_eq!(change.old.unwrap().get("completed"), Some(&json!(false)));
        assert_eq!(change.new.unwrap().get("completed"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let (repo, _) = setup_test_db().await;
        let mut ghost = Row::new("todos", "alice", Map::new());
        ghost.id = 42;

        assert!(matches!(repo.update(&ghost).await, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_row() {
        let (repo, _) = setup_test_db().await;
        let created = repo.create(&Row::new("todos", "alice", columns(json!({"text": "bye"})))).await.unwrap();
        let mut rx = repo.subscribe();

        repo.delete(created.id).await.expect("Delete failed");

        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
        let change = rx.recv_change().await.unwrap();
        assert_eq!(change.event_type, ChangeKind::Delete);
        assert!(change.new.is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_table_untouched() {
        let (repo, _) = setup_test_db().await;
        repo.faults().fail_next("offline");

        let result = repo.create(&Row::new("todos", "alice", columns(json!({"text": "a"})))).await;
        assert!(matches!(result, Err(DomainError::Unavailable(_))));
        assert!(repo.list().await.unwrap().is_empty());
    }
}
