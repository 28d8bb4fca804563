//! tidy-sync Backend
//!
//! Remote table service used by tidy-sync clients.
//!
//! Layered architecture:
//! - domain: rows, change events and errors
//! - repository: data access abstractions and the SQLite implementation
//! - realtime: per-table change feed
//! - faults: simulated latency and failures

pub mod domain;
pub mod repository;
pub mod realtime;
pub mod faults;

use std::path::Path;

pub use domain::{ChangeKind, DomainError, DomainResult, Entity, Row, RowChange};
pub use faults::FaultPlan;
pub use realtime::{ChangeFeed, ChangeReceiver, FeedItem};
pub use repository::{init_db, DbState, Repository, TableRepository};

/// One database plus its change feed; hands out per-table repositories
#[derive(Clone)]
pub struct TableService {
    db_state: DbState,
    feed: ChangeFeed,
    faults: FaultPlan,
}

impl TableService {
    /// Open the service database (":memory:" for an ephemeral one)
    pub async fn open(db_path: &Path) -> DomainResult<Self> {
        let db_state = init_db(db_path).await?;
        Ok(Self {
            db_state,
            feed: ChangeFeed::new(),
            faults: FaultPlan::new(),
        })
    }

    /// Repository for one user's rows of `table`; shares the service's fault plan
    pub fn table(&self, table: &str, user_id: &str) -> TableRepository {
        TableRepository::new(self.db_state.connection(), table, user_id, self.feed.clone())
            .with_faults(self.faults.clone())
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub async fn close(&self) {
        self.db_state.close().await;
    }
}
