//! Task status reference set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of task statuses.
///
/// `Completed` is the only final status; `Blocked` is the only blocking one.
/// Readiness checks require upstream tasks to be `Completed` specifically,
/// not merely final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Completed,
    Blocked,
}

impl TaskStatus {
    /// All statuses in display order
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Blocked,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(name: &str) -> Option<TaskStatus> {
        match name {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "completed" => Some(TaskStatus::Completed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "To do",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Review => "In review",
            TaskStatus::Completed => "Completed",
            TaskStatus::Blocked => "Blocked",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "#757575",
            TaskStatus::InProgress => "#1976d2",
            TaskStatus::Review => "#ed6c02",
            TaskStatus::Completed => "#2e7d32",
            TaskStatus::Blocked => "#d32f2f",
        }
    }

    pub fn order(&self) -> i32 {
        match self {
            TaskStatus::Blocked => 5,
            TaskStatus::Todo => 10,
            TaskStatus::InProgress => 20,
            TaskStatus::Review => 30,
            TaskStatus::Completed => 40,
        }
    }

    /// Terminal status; entering one triggers outgoing-edge evaluation
    pub fn is_final(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, TaskStatus::Blocked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
