//! Users as the engine sees them
//!
//! Authentication and profile management live outside the engine; only the
//! fields the engine reads are modeled. References to users from tasks,
//! events, and actions are weak: they survive deactivation and render as
//! "unknown" once the user is gone.

use serde::{Deserialize, Serialize};

/// Per-kind notification opt-outs; everything defaults to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub dependency_ready: bool,
    pub task_completed: bool,
    pub task_assigned: bool,
    pub deadline_approaching: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            dependency_ready: true,
            task_completed: true,
            task_assigned: true,
            deadline_approaching: true,
        }
    }
}

impl NotificationPreferences {
    /// All kinds muted
    pub fn muted() -> Self {
        Self {
            dependency_ready: false,
            task_completed: false,
            task_assigned: false,
            deadline_approaching: false,
        }
    }
}

/// Acting principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub is_active: bool,
    pub notification_preferences: NotificationPreferences,
}

/// Insert payload for a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub is_superuser: bool,
    pub notification_preferences: NotificationPreferences,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: false,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: true,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    pub fn with_preferences(mut self, preferences: NotificationPreferences) -> Self {
        self.notification_preferences = preferences;
        self
    }
}
