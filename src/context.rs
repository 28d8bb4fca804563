//! Application Context
//!
//! Explicit state container handed to whatever renders or handles events.
//! Owns the named stores, their dispatchers, the notifier and every
//! background subscription; nothing is looked up from ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use tidy_sync_backend::TableService;

use crate::config::{ClientConfig, StoreBackend, StoreConfig};
use crate::dispatcher::MutationDispatcher;
use crate::error::PersistError;
use crate::notify::Notifier;
use crate::persistence::{BackendTable, LocalPersistence, LocalStorage, RemoteAdapter, RemoteTable};
use crate::realtime::RealtimeBridge;
use crate::store::{IdMode, Store};
use crate::subscription::Subscription;

const APP_NAME: &str = "TidySync";

/// One named collection and how it is kept durable
#[derive(Clone)]
pub struct StoreHandle {
    pub store: Store,
    pub dispatcher: MutationDispatcher,
    local: Option<LocalPersistence>,
    remote: Option<RemoteAdapter>,
}

impl StoreHandle {
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Whether changes reach any durable medium
    pub fn is_saved(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }
}

pub struct AppContext {
    config: ClientConfig,
    notifier: Notifier,
    stores: HashMap<String, StoreHandle>,
    service: Option<TableService>,
    subscriptions: Vec<Subscription>,
}

pub struct AppContextBuilder {
    config: ClientConfig,
    service: Option<TableService>,
    tables: HashMap<String, Arc<dyn RemoteTable>>,
}

impl AppContextBuilder {
    /// Share an already-open table service (several clients, one service)
    pub fn with_service(mut self, service: TableService) -> Self {
        self.service = Some(service);
        self
    }

    /// Back the named store with a specific remote table
    pub fn with_table(mut self, store: &str, table: Arc<dyn RemoteTable>) -> Self {
        self.tables.insert(store.to_string(), table);
        self
    }

    /// Never fails: an unusable storage directory leaves local stores in
    /// memory only, and a service that will not open leaves remote stores local.
    pub async fn build(mut self) -> AppContext {
        let config = self.config;

        if let Some(log_dir) = &config.log_dir {
            match rolling_logger::init_logger(log_dir.clone(), APP_NAME) {
                Ok(()) | Err(rolling_logger::LoggerError::AlreadyInitialized) => {}
                Err(e) => eprintln!("[{}] Logger init failed: {}", APP_NAME, e),
            }
        }

        let storage = match LocalStorage::open(config.storage_dir.clone()) {
            Ok(storage) => Some(storage),
            Err(e) => {
                tracing::warn!(
                    dir = %config.storage_dir.display(),
                    "local storage unavailable, stores will not be saved: {}",
                    e
                );
                None
            }
        };

        let service = match (self.service.take(), &config.remote) {
            (Some(service), _) => Some(service),
            (None, Some(remote)) => match TableService::open(&remote.database_path).await {
                Ok(service) => Some(service),
                Err(e) => {
                    tracing::warn!(
                        path = %remote.database_path.display(),
                        "remote table service unavailable: {}",
                        e
                    );
                    None
                }
            },
            (None, None) => None,
        };

        // Stores first, so the notifier can keep its history in one of them
        let stores: Vec<(StoreConfig, Store)> = config
            .stores
            .iter()
            .map(|store_config| {
                let store = Store::new(&store_config.name, store_config.schema());
                (store_config.clone(), store)
            })
            .collect();

        let mut notifier = Notifier::new();
        if let Some(history) = &config.notification_store {
            match stores.iter().find(|(c, _)| &c.name == history) {
                Some((_, store)) => {
                    notifier = notifier.with_history(store.clone(), config.history_limit);
                }
                None => tracing::warn!("notification store `{}` is not configured", history),
            }
        }

        let mut handles = HashMap::new();
        let mut subscriptions = Vec::new();

        for (store_config, store) in stores {
            let table = match store_config.backend {
                StoreBackend::Remote => self.tables.remove(&store_config.name).or_else(|| {
                    service.as_ref().map(|service| {
                        let repo = service.table(store_config.key(), &config.user_id);
                        Arc::new(BackendTable::new(repo)) as Arc<dyn RemoteTable>
                    })
                }),
                StoreBackend::Local => None,
            };

            let handle = match table {
                Some(table) => {
                    let store = store.with_id_mode(IdMode::Temporary);
                    let adapter = RemoteAdapter::new(table.clone());
                    // Subscribe before the initial load so nothing slips in between
                    let feed = table.subscribe();
                    let bridge = RealtimeBridge::attach_with_resync(&store, feed, adapter.clone());
                    subscriptions.push(bridge);
                    adapter.load_into(&store).await;

                    let dispatcher =
                        MutationDispatcher::remote(store.clone(), table, notifier.clone());
                    StoreHandle {
                        dispatcher,
                        store,
                        local: None,
                        remote: Some(adapter),
                    }
                }
                None => {
                    if store_config.backend == StoreBackend::Remote {
                        tracing::warn!(
                            store = %store_config.name,
                            "no remote available, keeping store locally"
                        );
                    }
                    let persistence = storage.as_ref().map(|storage| {
                        let persistence =
                            LocalPersistence::new(storage.clone(), store_config.key());
                        subscriptions.push(persistence.attach(&store));
                        persistence
                    });

                    StoreHandle {
                        dispatcher: MutationDispatcher::local(store.clone(), notifier.clone()),
                        store,
                        local: persistence,
                        remote: None,
                    }
                }
            };

            tracing::info!(
                store = %store_config.name,
                remote = handle.is_remote(),
                saved = handle.is_saved(),
                count = handle.store.len(),
                "store ready"
            );
            handles.insert(store_config.name.clone(), handle);
        }

        AppContext {
            config,
            notifier,
            stores: handles,
            service,
            subscriptions,
        }
    }
}

impl AppContext {
    pub fn builder(config: ClientConfig) -> AppContextBuilder {
        AppContextBuilder {
            config,
            service: None,
            tables: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn service(&self) -> Option<&TableService> {
        self.service.as_ref()
    }

    pub fn handle(&self, name: &str) -> Option<&StoreHandle> {
        self.stores.get(name)
    }

    pub fn store(&self, name: &str) -> Option<&Store> {
        self.stores.get(name).map(|h| &h.store)
    }

    pub fn dispatcher(&self, name: &str) -> Option<&MutationDispatcher> {
        self.stores.get(name).map(|h| &h.dispatcher)
    }

    pub fn store_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Manual cache invalidation: reload the store from its medium
    pub async fn refresh(&self, name: &str) -> Result<usize, PersistError> {
        let handle = self
            .stores
            .get(name)
            .ok_or_else(|| PersistError::UnknownStore(name.to_string()))?;
        match (&handle.remote, &handle.local) {
            (Some(remote), _) => remote.refresh(&handle.store).await,
            (None, Some(local)) => {
                handle.store.replace_all(local.load());
                Ok(handle.store.len())
            }
            (None, None) => Ok(handle.store.len()),
        }
    }

    /// Write every local store now
    pub fn flush(&self) -> Result<(), PersistError> {
        for handle in self.stores.values() {
            if let Some(local) = &handle.local {
                local.flush(&handle.store)?;
            }
        }
        Ok(())
    }

    /// Flush local stores and stop all background tasks
    pub fn shutdown(mut self) -> Result<(), PersistError> {
        let flushed = self.flush();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        tracing::info!("context shut down");
        flushed
    }
}
