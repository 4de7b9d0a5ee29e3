//! Tasks: nodes in the project dependency graph

use crate::models::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounds on task names after trimming
pub const NAME_MIN_LEN: usize = 1;
pub const NAME_MAX_LEN: usize = 500;

/// Highest allowed priority value (0 = normal, 1 = high, 2 = critical)
pub const MAX_PRIORITY: u8 = 2;

/// A unit of work belonging to exactly one project.
///
/// `started_at` is stamped once, on the first transition into
/// `in_progress`; `completed_at` once, on the first transition into a final
/// status. `metadata` is an opaque blob the engine stores but never reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<i64>,
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: u8,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata: Option<String>,
}

impl Task {
    /// Apply a status transition, stamping the first-time timestamps.
    pub fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        if status == TaskStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_final() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Past its deadline and not yet in a final status
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => deadline < now && !self.status.is_final(),
            None => false,
        }
    }
}

/// Insert payload for a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee_id: Option<i64>,
    pub creator_id: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: u8,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for project task listings
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i64>,
    pub creator_id: Option<i64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_assignee(mut self, assignee_id: i64) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn with_creator(mut self, creator_id: i64) -> Self {
        self.creator_id = Some(creator_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if the task passes every set filter
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(assignee_id) = self.assignee_id {
            if task.assignee_id != Some(assignee_id) {
                return false;
            }
        }
        if let Some(creator_id) = self.creator_id {
            if task.creator_id != creator_id {
                return false;
            }
        }
        true
    }
}
