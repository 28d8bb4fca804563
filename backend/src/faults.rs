//! Fault Injection
//!
//! Simulated network conditions for the table service: queued per-call
//! latencies and queued failures. Used by clients to exercise their revert and
//! race paths deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{DomainError, DomainResult};

#[derive(Debug, Default)]
struct FaultState {
    delays: VecDeque<Duration>,
    failures: VecDeque<String>,
}

/// Shared, cloneable fault plan
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    state: Arc<Mutex<FaultState>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call sleeps for `delay` before touching the database
    pub fn push_delay(&self, delay: Duration) {
        self.with_state(|s| s.delays.push_back(delay));
    }

    /// The next call fails with `Unavailable(reason)`
    pub fn fail_next(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|s| s.failures.push_back(reason));
    }

    pub fn clear(&self) {
        self.with_state(|s| {
            s.delays.clear();
            s.failures.clear();
        });
    }

    /// Apply the next queued delay and failure, if any
    pub async fn before_call(&self, operation: &str) -> DomainResult<()> {
        let (delay, failure) = self.with_state(|s| (s.delays.pop_front(), s.failures.pop_front()));

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = failure {
            log::warn!("Injected failure for {}: {}", operation, reason);
            return Err(DomainError::Unavailable(reason));
        }
        Ok(())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FaultState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_consumed_in_order() {
        let plan = FaultPlan::new();
        plan.fail_next("offline");

        assert_eq!(
            plan.before_call("insert").await,
            Err(DomainError::Unavailable("offline".to_string()))
        );
        assert!(plan.before_call("insert").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_once() {
        let plan = FaultPlan::new();
        plan.push_delay(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        plan.before_call("update").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        plan.before_call("update").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
