//! Subscription disposer
//!
//! Background tasks (persistence writers, real-time bridges) are owned by a
//! `Subscription`. Dropping it, or calling `unsubscribe`, stops the task.

use tokio::task::JoinHandle;

#[must_use = "dropping a Subscription stops its task"]
pub struct Subscription {
    label: String,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(label: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            label: label.into(),
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `false` once stopped or once the task ended on its own
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!(subscription = %self.label, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}
