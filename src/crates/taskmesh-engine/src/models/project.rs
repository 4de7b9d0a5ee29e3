//! Projects: the scoping container for tasks and dependencies

use crate::models::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
    Deleted,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Deleted => "deleted",
        }
    }

    pub fn parse(name: &str) -> Option<ProjectStatus> {
        match name {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            "deleted" => Some(ProjectStatus::Deleted),
            _ => None,
        }
    }
}

/// Known project settings; anything beyond these is not the engine's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub default_task_status: TaskStatus,
    pub notifications_enabled: bool,
    pub allow_guest_comments: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            default_task_status: TaskStatus::Todo,
            notifications_enabled: true,
            allow_guest_comments: false,
        }
    }
}

/// A project owns its tasks, dependencies, events, and scheduled actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub status: ProjectStatus,
    pub settings: ProjectSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }
}

/// Insert payload for a project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub slug: String,
    pub settings: ProjectSettings,
}

impl NewProject {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            settings: ProjectSettings::default(),
        }
    }
}
