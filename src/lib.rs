//! Tidy Sync Client
//!
//! Local-first record stores: an in-memory ordered collection per store,
//! mirrored to a local key/value medium or to a remote table, changed
//! optimistically and reconciled when the medium answers.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod realtime;
pub mod store;
pub mod subscription;

pub use config::{ClientConfig, RemoteConfig, StoreBackend, StoreConfig};
pub use context::{AppContext, AppContextBuilder, StoreHandle};
pub use dispatcher::{MutationDispatcher, MutationOutcome, MutationState};
pub use error::{ConfigError, PersistError, StoreError};
pub use filter::{Filter, Stats, StatusFilter};
pub use models::{Draft, Fields, MutationId, Patch, Record, RecordId, RecordSchema};
pub use notify::{Level, Notification, Notifier};
pub use persistence::{BackendTable, LocalPersistence, LocalStorage, RemoteAdapter, RemoteTable};
pub use realtime::{ChangeEvent, ChangeSource, ChangeStream, EventType, RealtimeBridge, StreamItem};
pub use store::{IdMode, Snapshot, Store};
pub use subscription::Subscription;
