//! Record Store
//!
//! Holds one ordered collection and is the single source of truth for
//! rendering. Every mutation goes through the methods below; each is a short
//! critical section and the lock is never held across an `.await`.
//!
//! Every successful mutation bumps a revision published on a `watch` channel.
//! Subscribers see the latest revision only, so bursts of changes coalesce.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::error::StoreError;
use crate::filter::{Filter, Stats};
use crate::models::{Draft, Patch, Record, RecordId, RecordSchema};

/// How `add` picks identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Final ids right away (local-storage-only collections)
    Permanent,
    /// `tmp-` ids until the remote table assigns one
    Temporary,
}

/// Pre-mutation copy of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(Vec<Record>);

impl Snapshot {
    pub fn records(&self) -> &[Record] {
        &self.0
    }
}

/// Cheap-to-clone handle to one collection
#[derive(Clone)]
pub struct Store {
    name: Arc<str>,
    records: Arc<RwLock<Vec<Record>>>,
    schema: Arc<RecordSchema>,
    id_mode: IdMode,
    revision: Arc<watch::Sender<u64>>,
}

impl Store {
    pub fn new(name: &str, schema: RecordSchema) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            name: Arc::from(name),
            records: Arc::new(RwLock::new(Vec::new())),
            schema: Arc::new(schema),
            id_mode: IdMode::Permanent,
            revision: Arc::new(revision),
        }
    }

    pub fn with_id_mode(mut self, id_mode: IdMode) -> Self {
        self.id_mode = id_mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn id_mode(&self) -> IdMode {
        self.id_mode
    }

    // ========================
    // Mutations
    // ========================

    /// Validate, assign a fresh id and append
    pub fn add(&self, draft: Draft) -> Result<Record, StoreError> {
        self.schema.validate(&draft)?;
        let fields = self.schema.complete(draft);

        let record = self.write(|records| {
            let mut id = self.fresh_id();
            while records.iter().any(|r| r.id == id) {
                id = self.fresh_id();
            }
            let record = Record::new(id, fields);
            records.push(record.clone());
            record
        });

        tracing::debug!(store = %self.name, id = %record.id, "added record");
        self.touch();
        Ok(record)
    }

    /// Append a record that already has an id; replaces in place if the id exists.
    /// Returns `true` when the record was new.
    pub fn insert(&self, record: Record) -> bool {
        let inserted = self.write(|records| match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                records.push(record);
                true
            }
        });
        self.touch();
        inserted
    }

    /// Like `insert`, but a new record goes to `index` (clamped)
    pub fn insert_at(&self, index: usize, record: Record) -> bool {
        let inserted = self.write(|records| match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                let index = index.min(records.len());
                records.insert(index, record);
                true
            }
        });
        self.touch();
        inserted
    }

    /// Merge `patch` into the record; returns the previous version, `None` if absent
    pub fn update(&self, id: &RecordId, patch: &Patch) -> Option<Record> {
        let previous = self.write(|records| {
            let record = records.iter_mut().find(|r| &r.id == id)?;
            let previous = record.clone();
            record.merge(patch);
            Some(previous)
        });
        if previous.is_some() {
            self.touch();
        }
        previous
    }

    /// Undo one patch field by field. A field goes back to its value in
    /// `previous` only while it still holds the patched value; fields changed
    /// since then are left alone. Returns the record as it was before undoing.
    pub fn revert_patch(&self, id: &RecordId, patch: &Patch, previous: &Record) -> Option<Record> {
        let undone = self.write(|records| {
            let record = records.iter_mut().find(|r| &r.id == id)?;
            let undone = record.clone();
            for (field, value) in patch.iter() {
                if record.get(field) != Some(value) {
                    continue;
                }
                match previous.get(field) {
                    Some(old) => {
                        record.fields.insert(field.clone(), old.clone());
                    }
                    None => {
                        record.fields.remove(field);
                    }
                }
            }
            Some(undone)
        });
        if undone.is_some() {
            self.touch();
        }
        undone
    }

    /// Swap in a whole record with the same id; `None` (no insert) if absent
    pub fn replace(&self, record: Record) -> Option<Record> {
        let previous = self.write(|records| {
            let existing = records.iter_mut().find(|r| r.id == record.id)?;
            Some(std::mem::replace(existing, record))
        });
        if previous.is_some() {
            self.touch();
        }
        previous
    }

    /// Delete; returns the former position and record
    pub fn remove(&self, id: &RecordId) -> Option<(usize, Record)> {
        let removed = self.write(|records| {
            let index = records.iter().position(|r| &r.id == id)?;
            Some((index, records.remove(index)))
        });
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Replace the whole collection with authoritative state.
    /// Duplicate ids collapse onto the first position with the last contents.
    pub fn replace_all(&self, incoming: Vec<Record>) {
        let mut positions: HashMap<RecordId, usize> = HashMap::with_capacity(incoming.len());
        let mut deduped: Vec<Record> = Vec::with_capacity(incoming.len());
        for record in incoming {
            match positions.get(&record.id) {
                Some(&index) => deduped[index] = record,
                None => {
                    positions.insert(record.id.clone(), deduped.len());
                    deduped.push(record);
                }
            }
        }

        let count = deduped.len();
        self.write(|records| *records = deduped);
        tracing::debug!(store = %self.name, count, "replaced collection");
        self.touch();
    }

    /// Rename a temporary id to its permanent one.
    /// If the permanent id is already present (an echo got here first) the
    /// temporary record is dropped instead.
    pub fn rekey(&self, from: &RecordId, to: &RecordId) -> bool {
        if from == to {
            return self.contains(from);
        }
        let changed = self.write(|records| {
            let Some(index) = records.iter().position(|r| &r.id == from) else {
                return false;
            };
            if records.iter().any(|r| &r.id == to) {
                records.remove(index);
            } else {
                records[index].id = to.clone();
            }
            true
        });
        if changed {
            self.touch();
        }
        changed
    }

    /// Remove every record matching `predicate`; returns them with their former positions
    pub fn clear_where(&self, predicate: impl Fn(&Record) -> bool) -> Vec<(usize, Record)> {
        let removed = self.write(|records| {
            let mut removed = Vec::new();
            let mut kept = Vec::with_capacity(records.len());
            for (index, record) in records.drain(..).enumerate() {
                if predicate(&record) {
                    removed.push((index, record));
                } else {
                    kept.push(record);
                }
            }
            *records = kept;
            removed
        });
        if !removed.is_empty() {
            self.touch();
        }
        removed
    }

    /// Keep only the newest `limit` records; returns how many were dropped
    pub fn retain_last(&self, limit: usize) -> usize {
        let dropped = self.write(|records| {
            let excess = records.len().saturating_sub(limit);
            records.drain(..excess);
            excess
        });
        if dropped > 0 {
            self.touch();
        }
        dropped
    }

    pub fn restore(&self, snapshot: Snapshot) {
        self.replace_all(snapshot.0);
    }

    // ========================
    // Reads
    // ========================

    pub fn records(&self) -> Vec<Record> {
        self.read(|records| records.to_vec())
    }

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.read(|records| records.iter().find(|r| &r.id == id).cloned())
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.read(|records| records.iter().any(|r| &r.id == id))
    }

    pub fn len(&self) -> usize {
        self.read(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.records())
    }

    pub fn filtered(&self, filter: &Filter) -> Vec<Record> {
        self.read(|records| filter.apply(records, &self.schema))
    }

    pub fn stats(&self) -> Stats {
        self.read(|records| Stats::collect(records, &self.schema.status_field))
    }

    /// Current revision; bumps on every change
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Change notifications (latest revision only)
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ========================
    // Internals
    // ========================

    fn fresh_id(&self) -> RecordId {
        match self.id_mode {
            IdMode::Permanent => RecordId::generate(),
            IdMode::Temporary => RecordId::temporary(),
        }
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn read<R>(&self, f: impl FnOnce(&[Record]) -> R) -> R {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Vec<Record>) -> R) -> R {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("id_mode", &self.id_mode)
            .finish()
    }
}
