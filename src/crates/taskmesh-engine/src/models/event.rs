//! Immutable task event log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of task events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    StatusChanged,
    DependencyAdded,
    DependencyRemoved,
    AssigneeChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::StatusChanged => "status_changed",
            EventType::DependencyAdded => "dependency_added",
            EventType::DependencyRemoved => "dependency_removed",
            EventType::AssigneeChanged => "assignee_changed",
        }
    }

    pub fn parse(name: &str) -> Option<EventType> {
        match name {
            "created" => Some(EventType::Created),
            "updated" => Some(EventType::Updated),
            "status_changed" => Some(EventType::StatusChanged),
            "dependency_added" => Some(EventType::DependencyAdded),
            "dependency_removed" => Some(EventType::DependencyRemoved),
            "assignee_changed" => Some(EventType::AssigneeChanged),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only log line; never updated or deleted while its task lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub project_id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub event_type: EventType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Append payload for an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub project_id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub event_type: EventType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(
        project_id: i64,
        task_id: i64,
        user_id: i64,
        event_type: EventType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id,
            task_id,
            user_id,
            event_type,
            old_value: None,
            new_value: None,
            metadata: None,
            created_at,
        }
    }

    pub fn with_values(
        mut self,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
