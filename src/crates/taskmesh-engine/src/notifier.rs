//! Notification capability
//!
//! The engine delivers messages through the [`Notifier`] trait and treats
//! dispatch as fallibly asynchronous: a failure or timeout becomes a
//! per-action outcome, never an aborted batch. Whether the transport batches,
//! queues, or retries is its own concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Kinds of messages crossing the notifier boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskReady,
    TaskCompleted,
    TaskAssigned,
    DeadlineApproaching,
    Custom,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskReady => "task_ready",
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::DeadlineApproaching => "deadline_approaching",
            NotificationKind::Custom => "custom",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from notification dispatch
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Failed(String),

    #[error("notification dispatch timed out after {0:?}")]
    Timeout(Duration),
}

/// Out-of-band message delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: i64,
        kind: NotificationKind,
        payload: HashMap<String, String>,
    ) -> Result<(), NotifyError>;
}

/// Drops every message; for deployments without a notification channel
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(
        &self,
        _recipient: i64,
        _kind: NotificationKind,
        _payload: HashMap<String, String>,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A delivered message, as recorded by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: i64,
    pub kind: NotificationKind,
    pub payload: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryNotifierState {
    sent: Vec<SentNotification>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

/// Records deliveries for assertions; can be armed to fail or stall.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    state: Arc<Mutex<MemoryNotifierState>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries so far
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.state.lock().await.sent.clone()
    }

    /// Number of deliveries so far
    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }

    /// Make every subsequent dispatch fail with `reason`
    pub async fn fail_with(&self, reason: impl Into<String>) {
        self.state.lock().await.fail_with = Some(reason.into());
    }

    /// Make every subsequent dispatch sleep first (timeout testing)
    pub async fn delay_for(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    /// Forget recorded deliveries and armed behaviors
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.sent.clear();
        state.fail_with = None;
        state.delay = None;
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(
        &self,
        recipient: i64,
        kind: NotificationKind,
        payload: HashMap<String, String>,
    ) -> Result<(), NotifyError> {
        let delay = { self.state.lock().await.delay };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.fail_with {
            return Err(NotifyError::Failed(reason.clone()));
        }
        state.sent.push(SentNotification {
            recipient,
            kind,
            payload,
        });
        Ok(())
    }
}
