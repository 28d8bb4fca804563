//! Mutation Dispatcher
//!
//! User-facing operations: apply the change to the store optimistically, send
//! it to the remote table, then either keep it (`Confirmed`) or undo exactly
//! that change (`Reverted`), and emit a notification either way.
//!
//! There is no retry, no timeout and no cancellation. When two confirmations
//! touch the same record, the one that completes last wins: each confirmation
//! writes the server's copy of the record into the store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{PersistError, StoreError};
use crate::models::{Draft, MutationId, Patch, Record, RecordId};
use crate::notify::Notifier;
use crate::persistence::RemoteTable;
use crate::store::Store;

/// `Idle → OptimisticApplied → {Confirmed | Reverted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationState {
    /// Nothing was applied (e.g. the target record was already gone)
    Idle,
    OptimisticApplied,
    Confirmed,
    Reverted,
}

/// What became of one mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub mutation: MutationId,
    pub state: MutationState,
    /// The record as it stands after resolution: the confirmed copy, or the
    /// optimistic guess that was undone
    pub record: Option<Record>,
    pub error: Option<String>,
}

impl MutationOutcome {
    fn idle(mutation: MutationId) -> Self {
        Self { mutation, state: MutationState::Idle, record: None, error: None }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == MutationState::Confirmed
    }

    pub fn is_reverted(&self) -> bool {
        self.state == MutationState::Reverted
    }
}

/// Final id of a record that was added with a temporary id
#[derive(Debug, Clone, PartialEq)]
enum IdResolution {
    Pending,
    Confirmed(RecordId),
    Reverted,
}

/// Temporary ids of in-flight (or finished) adds
#[derive(Clone, Default)]
struct PendingIds {
    inner: Arc<Mutex<HashMap<RecordId, watch::Receiver<IdResolution>>>>,
}

impl PendingIds {
    fn register(&self, id: &RecordId) -> watch::Sender<IdResolution> {
        let (tx, rx) = watch::channel(IdResolution::Pending);
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).insert(id.clone(), rx);
        tx
    }

    /// Drop a resolved entry; waiters keep their own receiver
    fn forget(&self, id: &RecordId) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }

    /// Permanent id for `id`, waiting for its add to resolve; `None` if the add was reverted.
    /// The lookup happens now, not when the future is first polled.
    fn resolve(&self, id: &RecordId) -> impl Future<Output = Option<RecordId>> + Send + 'static {
        let id = id.clone();
        let rx = if id.is_temporary() {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
        } else {
            None
        };

        async move {
            // Permanent, or never sent anywhere
            let Some(mut rx) = rx else {
                return Some(id);
            };
            let resolution = match rx.wait_for(|r| *r != IdResolution::Pending).await {
                Ok(resolution) => resolution.clone(),
                Err(_) => IdResolution::Reverted,
            };
            match resolution {
                IdResolution::Confirmed(permanent) => Some(permanent),
                _ => None,
            }
        }
    }
}

/// Decrements the loading counter when a remote call resolves
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Composes store mutations with remote calls and notifications
#[derive(Clone)]
pub struct MutationDispatcher {
    store: Store,
    remote: Option<Arc<dyn RemoteTable>>,
    notifier: Notifier,
    pending: PendingIds,
    in_flight: Arc<AtomicUsize>,
}

impl MutationDispatcher {
    /// Dispatcher for a local-only store; optimistic state is final at once
    pub fn local(store: Store, notifier: Notifier) -> Self {
        Self {
            store,
            remote: None,
            notifier,
            pending: PendingIds::default(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn remote(store: Store, remote: Arc<dyn RemoteTable>, notifier: Notifier) -> Self {
        Self {
            remote: Some(remote),
            ..Self::local(store, notifier)
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Remote calls not yet resolved
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The "loading" flag
    pub fn is_loading(&self) -> bool {
        self.in_flight() > 0
    }

    // ========================
    // Operations
    // ========================

    /// Add a record. Validation failures are returned and nothing is applied.
    pub async fn add(&self, draft: Draft) -> Result<MutationOutcome, StoreError> {
        let mutation = MutationId::new();
        let optimistic = self.store.add(draft)?;
        tracing::debug!(store = %self.store.name(), %mutation, id = %optimistic.id, "add applied");

        let Some(remote) = &self.remote else {
            return Ok(self.confirmed(mutation, "Added", Some(optimistic)));
        };

        let _loading = InFlight::start(&self.in_flight);
        let resolution = self.pending.register(&optimistic.id);

        match remote.insert(mutation, optimistic.fields.clone()).await {
            Ok(saved) => {
                self.store.rekey(&optimistic.id, &saved.id);
                self.store.replace(saved.clone());
                let _ = resolution.send(IdResolution::Confirmed(saved.id.clone()));
                self.pending.forget(&optimistic.id);
                Ok(self.confirmed(mutation, "Added", Some(saved)))
            }
            Err(e) => {
                self.store.remove(&optimistic.id);
                let _ = resolution.send(IdResolution::Reverted);
                self.pending.forget(&optimistic.id);
                Ok(self.reverted(mutation, "add", Some(optimistic), e))
            }
        }
    }

    /// Merge `patch` into a record. A missing record is not an error.
    pub async fn update(&self, id: &RecordId, patch: Patch) -> Result<MutationOutcome, StoreError> {
        self.store.schema().validate_patch(&patch)?;
        let mutation = MutationId::new();

        let Some(previous) = self.store.update(id, &patch) else {
            tracing::debug!(store = %self.store.name(), %id, "update of missing record ignored");
            return Ok(MutationOutcome::idle(mutation));
        };

        let Some(remote) = &self.remote else {
            return Ok(self.confirmed(mutation, "Saved", self.store.get(id)));
        };

        let _loading = InFlight::start(&self.in_flight);
        let Some(target) = self.pending.resolve(id).await else {
            // The add this record came from was reverted; nothing left to update
            let error = PersistError::UnknownRecord(id.clone());
            return Ok(self.reverted(mutation, "update", Some(previous), error));
        };

        match remote.update(mutation, &target, &patch).await {
            Ok(saved) => {
                self.store.replace(saved.clone());
                Ok(self.confirmed(mutation, "Saved", Some(saved)))
            }
            Err(e) => {
                // Only this patch is undone; later confirmations stay
                let undone = self.store.revert_patch(&target, &patch, &previous);
                Ok(self.reverted(mutation, "update", undone, e))
            }
        }
    }

    /// Flip the record's status field
    pub async fn toggle(&self, id: &RecordId) -> Result<MutationOutcome, StoreError> {
        let Some(current) = self.store.get(id) else {
            return Ok(MutationOutcome::idle(MutationId::new()));
        };
        let status_field = self.store.schema().status_field.clone();
        let next = !current.flag(&status_field);
        self.update(id, Patch::new().set(status_field, next)).await
    }

    pub async fn remove(&self, id: &RecordId) -> MutationOutcome {
        let mutation = MutationId::new();
        let Some((index, removed)) = self.store.remove(id) else {
            return MutationOutcome::idle(mutation);
        };

        let Some(remote) = &self.remote else {
            return self.confirmed(mutation, "Deleted", Some(removed));
        };

        let _loading = InFlight::start(&self.in_flight);
        let Some(target) = self.pending.resolve(id).await else {
            // Never made it to the server
            return self.confirmed(mutation, "Deleted", Some(removed));
        };

        match remote.delete(mutation, &target).await {
            Ok(()) => self.confirmed(mutation, "Deleted", Some(removed)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(store = %self.store.name(), %target, "already deleted remotely");
                self.confirmed(mutation, "Deleted", Some(removed))
            }
            Err(e) => {
                let mut restored = removed;
                restored.id = target;
                self.store.insert_at(index, restored.clone());
                self.reverted(mutation, "delete", Some(restored), e)
            }
        }
    }

    /// Remove every completed record; failed deletes are put back in place
    pub async fn clear_completed(&self) -> MutationOutcome {
        let mutation = MutationId::new();
        let status_field = self.store.schema().status_field.clone();
        let removed = self.store.clear_where(|r| r.get(&status_field) == Some(&Value::Bool(true)));
        if removed.is_empty() {
            return MutationOutcome::idle(mutation);
        }

        let Some(remote) = &self.remote else {
            return self.confirmed(mutation, format!("Cleared {}", removed.len()), None);
        };

        let _loading = InFlight::start(&self.in_flight);
        let mut failed: Vec<(usize, Record)> = Vec::new();
        let mut last_error = None;

        let removed: Vec<_> = removed
            .into_iter()
            .map(|(index, record)| {
                let target = self.pending.resolve(&record.id);
                (index, record, target)
            })
            .collect();

        for (index, record, target) in removed {
            let Some(target) = target.await else {
                continue;
            };
            match remote.delete(mutation, &target).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    let mut restored = record;
                    restored.id = target;
                    failed.push((index, restored));
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => self.confirmed(mutation, "Cleared completed", None),
            Some(e) => {
                // Ascending original positions, so each lands where it was
                for (index, record) in failed {
                    self.store.insert_at(index, record);
                }
                self.reverted(mutation, "clear completed", None, e)
            }
        }
    }

    // ========================
    // Resolution
    // ========================

    fn confirmed(
        &self,
        mutation: MutationId,
        message: impl Into<String>,
        record: Option<Record>,
    ) -> MutationOutcome {
        self.notifier.success(Some(mutation), message);
        MutationOutcome { mutation, state: MutationState::Confirmed, record, error: None }
    }

    fn reverted(
        &self,
        mutation: MutationId,
        action: &str,
        record: Option<Record>,
        error: PersistError,
    ) -> MutationOutcome {
        let message = format!("Could not {} in {}: {}", action, self.store.name(), error);
        self.notifier.error(Some(mutation), message.clone());
        MutationOutcome {
            mutation,
            state: MutationState::Reverted,
            record,
            error: Some(message),
        }
    }
}
