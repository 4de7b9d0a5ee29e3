//! Deferred work units drained by the scheduler worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Families of scheduled work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledKind {
    /// Deadline reminder emitted on task create/update
    DeadlineApproaching,
    /// Deferred dependency action emitted by the evaluator
    DelayedNotification,
}

impl ScheduledKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledKind::DeadlineApproaching => "deadline_approaching",
            ScheduledKind::DelayedNotification => "delayed_notification",
        }
    }

    pub fn parse(name: &str) -> Option<ScheduledKind> {
        match name {
            "deadline_approaching" => Some(ScheduledKind::DeadlineApproaching),
            "delayed_notification" => Some(ScheduledKind::DelayedNotification),
            _ => None,
        }
    }
}

impl fmt::Display for ScheduledKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Row lifecycle: `pending -> processing -> completed | failed`.
///
/// Transitions are linearizable per row; a `processing` row is only ever
/// re-claimed after the reaper sweeps it back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScheduledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledStatus::Pending => "pending",
            ScheduledStatus::Processing => "processing",
            ScheduledStatus::Completed => "completed",
            ScheduledStatus::Failed => "failed",
        }
    }

    pub fn parse(name: &str) -> Option<ScheduledStatus> {
        match name {
            "pending" => Some(ScheduledStatus::Pending),
            "processing" => Some(ScheduledStatus::Processing),
            "completed" => Some(ScheduledStatus::Completed),
            "failed" => Some(ScheduledStatus::Failed),
            _ => None,
        }
    }
}

/// A persisted unit of future work keyed by due time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: i64,
    pub project_id: i64,
    pub task_id: i64,
    pub kind: ScheduledKind,
    pub scheduled_for: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
    pub dependency_action_id: Option<i64>,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a scheduled action
#[derive(Debug, Clone)]
pub struct NewScheduledAction {
    pub project_id: i64,
    pub task_id: i64,
    pub kind: ScheduledKind,
    pub scheduled_for: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
    pub dependency_action_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_roundtrip() {
        for kind in [
            ScheduledKind::DeadlineApproaching,
            ScheduledKind::DelayedNotification,
        ] {
            assert_eq!(ScheduledKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ScheduledKind::parse("retry"), None);
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            ScheduledStatus::Pending,
            ScheduledStatus::Processing,
            ScheduledStatus::Completed,
            ScheduledStatus::Failed,
        ] {
            assert_eq!(ScheduledStatus::parse(status.as_str()), Some(status));
        }
    }
}
