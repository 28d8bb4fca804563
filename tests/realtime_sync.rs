//! Two clients sharing one table service see each other's changes through
//! the real-time feed.

use std::path::Path;
use std::time::Duration;

use tidy_sync::{AppContext, ClientConfig, Draft, Patch, StoreBackend, StoreConfig};
use tidy_sync_backend::TableService;

fn client(dir: &Path, user: &str) -> ClientConfig {
    ClientConfig {
        storage_dir: dir.join(user),
        log_dir: None,
        user_id: user.to_string(),
        remote: None,
        stores: vec![
            StoreConfig::new("itinerary", StoreBackend::Remote).with_fields("activity", "completed")
        ],
        notification_store: None,
        history_limit: 50,
    }
}

async fn connect(service: &TableService, dir: &Path, user: &str) -> AppContext {
    AppContext::builder(client(dir, user))
        .with_service(service.clone())
        .build()
        .await
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn changes_propagate_between_clients_of_the_same_user() {
    let dir = tempfile::tempdir().unwrap();
    let service = TableService::open(Path::new(":memory:")).await.unwrap();
    let phone = connect(&service, dir.path(), "alice").await;
    let laptop = connect(&service, dir.path(), "alice").await;

    let added = phone
        .dispatcher("itinerary")
        .unwrap()
        .add(Draft::new().with("activity", "Louvre"))
        .await
        .unwrap();
    let id = added.record.unwrap().id;

    let seen = laptop.store("itinerary").unwrap().clone();
    assert!(eventually(|| seen.get(&id).is_some()).await);
    assert_eq!(seen.get(&id).unwrap().text("activity"), Some("Louvre"));

    laptop
        .dispatcher("itinerary")
        .unwrap()
        .update(&id, Patch::new().set("completed", true))
        .await
        .unwrap();
    let mirror = phone.store("itinerary").unwrap().clone();
    assert!(eventually(|| mirror.get(&id).map(|r| r.flag("completed")).unwrap_or(false)).await);

    phone.dispatcher("itinerary").unwrap().remove(&id).await;
    assert!(eventually(|| seen.is_empty()).await);

    // The phone's own echoes never duplicate its records
    assert!(mirror.is_empty());
}

#[tokio::test]
async fn other_users_do_not_receive_changes() {
    let dir = tempfile::tempdir().unwrap();
    let service = TableService::open(Path::new(":memory:")).await.unwrap();
    let alice = connect(&service, dir.path(), "alice").await;
    let bob = connect(&service, dir.path(), "bob").await;

    alice
        .dispatcher("itinerary")
        .unwrap()
        .add(Draft::new().with("activity", "Eiffel tower"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(bob.store("itinerary").unwrap().is_empty());
    assert_eq!(bob.refresh("itinerary").await.unwrap(), 0);
    assert_eq!(alice.refresh("itinerary").await.unwrap(), 1);
}

#[tokio::test]
async fn shutdown_stops_listening() {
    let dir = tempfile::tempdir().unwrap();
    let service = TableService::open(Path::new(":memory:")).await.unwrap();
    let writer = connect(&service, dir.path(), "alice").await;
    let reader = connect(&service, dir.path(), "alice").await;
    let detached = reader.store("itinerary").unwrap().clone();

    reader.shutdown().unwrap();
    writer
        .dispatcher("itinerary")
        .unwrap()
        .add(Draft::new().with("activity", "Seine cruise"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(detached.is_empty());
    assert_eq!(writer.store("itinerary").unwrap().len(), 1);
}
