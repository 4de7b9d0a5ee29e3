//! Dependency actions: rules that fire when an edge's source completes

use crate::models::status::TaskStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of action kinds.
///
/// Each kind declares what configuration it needs; the engine validates the
/// flags when an action is attached to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    NotifyAssignee,
    NotifyCreator,
    NotifyCustom,
    ChangeStatus,
    CreateSubtask,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::NotifyAssignee,
        ActionKind::NotifyCreator,
        ActionKind::NotifyCustom,
        ActionKind::ChangeStatus,
        ActionKind::CreateSubtask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::NotifyAssignee => "notify_assignee",
            ActionKind::NotifyCreator => "notify_creator",
            ActionKind::NotifyCustom => "notify_custom",
            ActionKind::ChangeStatus => "change_status",
            ActionKind::CreateSubtask => "create_subtask",
        }
    }

    pub fn parse(code: &str) -> Option<ActionKind> {
        match code {
            "notify_assignee" => Some(ActionKind::NotifyAssignee),
            "notify_creator" => Some(ActionKind::NotifyCreator),
            "notify_custom" => Some(ActionKind::NotifyCustom),
            "change_status" => Some(ActionKind::ChangeStatus),
            "create_subtask" => Some(ActionKind::CreateSubtask),
            _ => None,
        }
    }

    /// The action must name an explicit recipient
    pub fn requires_target_user(&self) -> bool {
        matches!(self, ActionKind::NotifyCustom | ActionKind::CreateSubtask)
    }

    /// The action carries a message template
    pub fn requires_template(&self) -> bool {
        matches!(
            self,
            ActionKind::NotifyAssignee | ActionKind::NotifyCreator | ActionKind::NotifyCustom
        )
    }

    /// The action may be deferred via `delay_minutes`
    pub fn supports_delay(&self) -> bool {
        matches!(self, ActionKind::NotifyCustom | ActionKind::ChangeStatus)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordered rule on a dependency, executed when the edge's source reaches
/// a final status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyAction {
    pub id: i64,
    pub dependency_id: i64,
    pub kind: ActionKind,
    pub target_user_id: Option<i64>,
    pub target_status: Option<TaskStatus>,
    pub message_template: Option<String>,
    pub delay_minutes: u32,
    pub execute_order: i32,
    pub is_active: bool,
}

/// Insert payload for a dependency action
#[derive(Debug, Clone)]
pub struct NewDependencyAction {
    pub dependency_id: i64,
    pub kind: ActionKind,
    pub target_user_id: Option<i64>,
    pub target_status: Option<TaskStatus>,
    pub message_template: Option<String>,
    pub delay_minutes: u32,
    pub execute_order: i32,
}

impl NewDependencyAction {
    pub fn new(dependency_id: i64, kind: ActionKind) -> Self {
        Self {
            dependency_id,
            kind,
            target_user_id: None,
            target_status: None,
            message_template: None,
            delay_minutes: 0,
            execute_order: 0,
        }
    }

    pub fn with_target_user(mut self, user_id: i64) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn with_target_status(mut self, status: TaskStatus) -> Self {
        self.target_status = Some(status);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.message_template = Some(template.into());
        self
    }

    pub fn with_delay_minutes(mut self, minutes: u32) -> Self {
        self.delay_minutes = minutes;
        self
    }

    pub fn with_execute_order(mut self, order: i32) -> Self {
        self.execute_order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("escalate"), None);
    }

    #[test]
    fn kind_flags() {
        assert!(ActionKind::NotifyCustom.requires_target_user());
        assert!(ActionKind::CreateSubtask.requires_target_user());
        assert!(!ActionKind::NotifyAssignee.requires_target_user());

        assert!(ActionKind::NotifyAssignee.requires_template());
        assert!(!ActionKind::ChangeStatus.requires_template());

        assert!(ActionKind::ChangeStatus.supports_delay());
        assert!(ActionKind::NotifyCustom.supports_delay());
        assert!(!ActionKind::NotifyAssignee.supports_delay());
    }

    #[test]
    fn builder_chain() {
        let action = NewDependencyAction::new(3, ActionKind::ChangeStatus)
            .with_target_status(TaskStatus::InProgress)
            .with_delay_minutes(15)
            .with_execute_order(2);
        assert_eq!(action.dependency_id, 3);
        assert_eq!(action.target_status, Some(TaskStatus::InProgress));
        assert_eq!(action.delay_minutes, 15);
        assert_eq!(action.execute_order, 2);
    }
}
