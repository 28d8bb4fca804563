//! Persistence adapters
//!
//! Translate store mutations into durable writes, and durable-medium changes
//! back into store updates.

mod local;
mod remote;

pub use local::{LocalPersistence, LocalStorage};
pub use remote::{BackendTable, RemoteAdapter, RemoteTable};
