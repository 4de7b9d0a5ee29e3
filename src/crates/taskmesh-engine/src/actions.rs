//! Dependency-action evaluation
//!
//! When a task enters a final status, every outgoing edge's active actions
//! run in `(execute_order, id)` order: immediate actions dispatch here,
//! delayed ones become scheduled rows for the worker. A failing action is
//! recorded and the batch continues.
//!
//! Completion cascades are iterative: a `change_status` action that pushes
//! its target into a final status enqueues that target on an explicit stack,
//! so arbitrarily long chains run in constant native stack.

use crate::engine::TaskEngine;
use crate::error::EngineError;
use crate::models::{
    ActionKind, Dependency, DependencyAction, NewScheduledAction, ScheduledAction,
    ScheduledKind, TaskStatus, User,
};
use crate::notifier::NotificationKind;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Trigger tag for actions fired by a completion
pub const TRIGGER_TASK_COMPLETED: &str = "task_completed";

/// Trigger tag for actions replayed by the scheduler
pub const TRIGGER_DELAYED: &str = "delayed";

/// Default template when a `notify_assignee` action has none
pub const DEFAULT_READY_TEMPLATE: &str = "Task {task_name} is ready to start";

/// Default template when a `notify_creator` action has none
pub const DEFAULT_COMPLETED_TEMPLATE: &str = "Task {task_name} completed";

/// Default template when a `notify_custom` action has none
pub const DEFAULT_CUSTOM_TEMPLATE: &str = "Update on task {task_name}";

/// Pure substitution of `{key}` placeholders; unknown placeholders render
/// literally.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// How a single action ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDispatch {
    Executed,
    Scheduled,
    Skipped,
    Failed,
    NotImplemented,
}

impl ActionDispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionDispatch::Executed => "executed",
            ActionDispatch::Scheduled => "scheduled",
            ActionDispatch::Skipped => "skipped",
            ActionDispatch::Failed => "failed",
            ActionDispatch::NotImplemented => "not_implemented",
        }
    }
}

/// Per-action record returned from an evaluation batch
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action_id: i64,
    pub kind: ActionKind,
    pub status: ActionDispatch,
    pub target_user_id: Option<i64>,
    pub new_status: Option<TaskStatus>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

impl ActionOutcome {
    fn new(action: &DependencyAction, status: ActionDispatch) -> Self {
        Self {
            action_id: action.id,
            kind: action.kind,
            status,
            target_user_id: None,
            new_status: None,
            scheduled_for: None,
            detail: None,
        }
    }

    fn failed(action: &DependencyAction, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(action, ActionDispatch::Failed)
        }
    }

    fn skipped(action: &DependencyAction, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(action, ActionDispatch::Skipped)
        }
    }
}

impl TaskEngine {
    /// Evaluate outgoing edges of every newly-final task, depth-first.
    ///
    /// `change_status` actions that complete their target push it onto the
    /// stack; the DAG invariant guarantees termination.
    pub(crate) async fn run_completion_cascade(
        &self,
        root_task_id: i64,
        actor: &User,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        let mut stack = vec![root_task_id];

        while let Some(task_id) = stack.pop() {
            let outgoing = match self.store.outgoing_dependencies(task_id).await {
                Ok(edges) => edges,
                Err(err) => {
                    error!(task_id, error = %err, "failed to load outgoing edges");
                    continue;
                }
            };
            for edge in outgoing {
                let (mut edge_outcomes, newly_final) = self
                    .evaluate_dependency(&edge, TRIGGER_TASK_COMPLETED, actor)
                    .await;
                outcomes.append(&mut edge_outcomes);
                stack.extend(newly_final);
            }
        }

        outcomes
    }

    /// Run the ordered action list of one edge.
    ///
    /// Returns the per-action outcomes plus the ids of target tasks that a
    /// `change_status` action pushed into a final status.
    pub(crate) async fn evaluate_dependency(
        &self,
        edge: &Dependency,
        trigger: &str,
        actor: &User,
    ) -> (Vec<ActionOutcome>, Vec<i64>) {
        let actions = match self.store.active_actions(edge.id).await {
            Ok(actions) => actions,
            Err(err) => {
                error!(dependency_id = edge.id, error = %err, "failed to load actions");
                return (Vec::new(), Vec::new());
            }
        };

        let mut outcomes = Vec::with_capacity(actions.len());
        let mut newly_final = Vec::new();

        for action in actions {
            if action.delay_minutes > 0 {
                match self.schedule_delayed(edge, &action, trigger, actor).await {
                    Ok(scheduled) => {
                        debug!(
                            action_id = action.id,
                            scheduled_for = %scheduled.scheduled_for,
                            "action deferred"
                        );
                        outcomes.push(ActionOutcome {
                            scheduled_for: Some(scheduled.scheduled_for),
                            ..ActionOutcome::new(&action, ActionDispatch::Scheduled)
                        });
                    }
                    Err(err) => outcomes.push(ActionOutcome::failed(&action, err.to_string())),
                }
                continue;
            }

            let (outcome, completed_target) =
                self.execute_action(&action, edge, trigger, actor).await;
            outcomes.push(outcome);
            if let Some(task_id) = completed_target {
                newly_final.push(task_id);
            }
        }

        (outcomes, newly_final)
    }

    async fn schedule_delayed(
        &self,
        edge: &Dependency,
        action: &DependencyAction,
        trigger: &str,
        actor: &User,
    ) -> Result<ScheduledAction> {
        let now = self.clock.now();
        let row = self
            .store
            .insert_scheduled(NewScheduledAction {
                project_id: edge.project_id,
                task_id: edge.target_task_id,
                kind: ScheduledKind::DelayedNotification,
                scheduled_for: now + Duration::minutes(action.delay_minutes as i64),
                payload: Some(json!({
                    "action_id": action.id,
                    "trigger_event": trigger,
                    "triggered_by": actor.username,
                })),
                dependency_action_id: Some(action.id),
                created_at: now,
            })
            .await?;
        Ok(row)
    }

    /// Execute one immediate action; never propagates a failure.
    ///
    /// The second return value is the target task id when a `change_status`
    /// action pushed it into a final status.
    pub(crate) async fn execute_action(
        &self,
        action: &DependencyAction,
        edge: &Dependency,
        trigger: &str,
        actor: &User,
    ) -> (ActionOutcome, Option<i64>) {
        debug!(
            action_id = action.id,
            kind = %action.kind,
            trigger,
            "executing dependency action"
        );
        match action.kind {
            ActionKind::NotifyAssignee => (self.notify_assignee(action, edge).await, None),
            ActionKind::NotifyCreator => (self.notify_creator(action, edge).await, None),
            ActionKind::NotifyCustom => (self.notify_custom(action, edge).await, None),
            ActionKind::ChangeStatus => self.change_target_status(action, edge, actor).await,
            ActionKind::CreateSubtask => (
                ActionOutcome {
                    detail: Some("subtask creation is not implemented".to_string()),
                    ..ActionOutcome::new(action, ActionDispatch::NotImplemented)
                },
                None,
            ),
        }
    }

    pub(crate) async fn project_name(&self, project_id: i64) -> String {
        match self.store.project(project_id).await {
            Ok(Some(project)) => project.name,
            _ => "unknown".to_string(),
        }
    }

    fn message_payload(
        task_id: i64,
        task_name: &str,
        project_name: &str,
        message: String,
    ) -> HashMap<String, String> {
        HashMap::from([
            ("task_id".to_string(), task_id.to_string()),
            ("task_name".to_string(), task_name.to_string()),
            ("project_name".to_string(), project_name.to_string()),
            ("message".to_string(), message),
        ])
    }

    async fn notify_assignee(
        &self,
        action: &DependencyAction,
        edge: &Dependency,
    ) -> ActionOutcome {
        let target = match self.load_task(edge.target_task_id).await {
            Ok(task) => task,
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        let Some(assignee_id) = target.assignee_id else {
            return ActionOutcome::skipped(action, "target task has no assignee");
        };
        let recipient = match self.store.user(assignee_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return ActionOutcome::skipped(action, "assignee no longer exists"),
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        if !recipient.notification_preferences.dependency_ready {
            return ActionOutcome::skipped(action, "dependency_ready notifications disabled");
        }

        let project_name = self.project_name(edge.project_id).await;
        let template = action
            .message_template
            .as_deref()
            .unwrap_or(DEFAULT_READY_TEMPLATE);
        let message = render_template(
            template,
            &[
                ("task_name", target.name.as_str()),
                ("project_name", project_name.as_str()),
                ("user", recipient.username.as_str()),
            ],
        );
        let payload =
            Self::message_payload(target.id, &target.name, &project_name, message);

        match self
            .dispatch(recipient.id, NotificationKind::TaskReady, payload)
            .await
        {
            Ok(()) => ActionOutcome {
                target_user_id: Some(recipient.id),
                ..ActionOutcome::new(action, ActionDispatch::Executed)
            },
            Err(err) => ActionOutcome::failed(action, err.to_string()),
        }
    }

    async fn notify_creator(
        &self,
        action: &DependencyAction,
        edge: &Dependency,
    ) -> ActionOutcome {
        let source = match self.load_task(edge.source_task_id).await {
            Ok(task) => task,
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        let recipient = match self.store.user(source.creator_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return ActionOutcome::skipped(action, "creator no longer exists"),
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        if !recipient.notification_preferences.task_completed {
            return ActionOutcome::skipped(action, "task_completed notifications disabled");
        }

        let project_name = self.project_name(edge.project_id).await;
        let template = action
            .message_template
            .as_deref()
            .unwrap_or(DEFAULT_COMPLETED_TEMPLATE);
        let message = render_template(
            template,
            &[
                ("task_name", source.name.as_str()),
                ("project_name", project_name.as_str()),
                ("user", recipient.username.as_str()),
            ],
        );
        let payload =
            Self::message_payload(source.id, &source.name, &project_name, message);

        match self
            .dispatch(recipient.id, NotificationKind::TaskCompleted, payload)
            .await
        {
            Ok(()) => ActionOutcome {
                target_user_id: Some(recipient.id),
                ..ActionOutcome::new(action, ActionDispatch::Executed)
            },
            Err(err) => ActionOutcome::failed(action, err.to_string()),
        }
    }

    async fn notify_custom(
        &self,
        action: &DependencyAction,
        edge: &Dependency,
    ) -> ActionOutcome {
        let Some(target_user_id) = action.target_user_id else {
            return ActionOutcome::failed(action, "notify_custom has no target user");
        };
        let recipient = match self.store.user(target_user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return ActionOutcome::skipped(action, "target user no longer exists"),
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        // custom notifications are always delivered, no preference gate

        let target = match self.load_task(edge.target_task_id).await {
            Ok(task) => task,
            Err(err) => return ActionOutcome::failed(action, err.to_string()),
        };
        let project_name = self.project_name(edge.project_id).await;
        let template = action
            .message_template
            .as_deref()
            .unwrap_or(DEFAULT_CUSTOM_TEMPLATE);
        let message = render_template(
            template,
            &[
                ("task_name", target.name.as_str()),
                ("project_name", project_name.as_str()),
                ("user", recipient.username.as_str()),
            ],
        );
        let payload =
            Self::message_payload(target.id, &target.name, &project_name, message);

        match self
            .dispatch(recipient.id, NotificationKind::Custom, payload)
            .await
        {
            Ok(()) => ActionOutcome {
                target_user_id: Some(recipient.id),
                ..ActionOutcome::new(action, ActionDispatch::Executed)
            },
            Err(err) => ActionOutcome::failed(action, err.to_string()),
        }
    }

    async fn change_target_status(
        &self,
        action: &DependencyAction,
        edge: &Dependency,
        actor: &User,
    ) -> (ActionOutcome, Option<i64>) {
        let Some(new_status) = action.target_status else {
            return (
                ActionOutcome::failed(action, "change_status has no target status"),
                None,
            );
        };

        let metadata = json!({ "triggered_by_action": action.id });
        match self
            .apply_status_transition(edge.target_task_id, new_status, actor, Some(metadata))
            .await
        {
            Ok(transition) => {
                let completed = transition
                    .crossed_final
                    .then_some(edge.target_task_id);
                (
                    ActionOutcome {
                        new_status: Some(new_status),
                        ..ActionOutcome::new(action, ActionDispatch::Executed)
                    },
                    completed,
                )
            }
            Err(err) => (ActionOutcome::failed(action, err.to_string()), None),
        }
    }

    // ------------------------------------------------------------------
    // scheduler entry points
    // ------------------------------------------------------------------

    /// Execute one claimed scheduled row; returns the payload to persist.
    pub async fn execute_scheduled(
        &self,
        scheduled: &ScheduledAction,
    ) -> Result<serde_json::Value> {
        match scheduled.kind {
            ScheduledKind::DeadlineApproaching => self.execute_deadline_reminder(scheduled).await,
            ScheduledKind::DelayedNotification => self.execute_delayed_action(scheduled).await,
        }
    }

    async fn execute_deadline_reminder(
        &self,
        scheduled: &ScheduledAction,
    ) -> Result<serde_json::Value> {
        let task = self.load_task(scheduled.task_id).await?;
        let hours_left = scheduled
            .payload
            .as_ref()
            .and_then(|p| p.get("hours_before"))
            .and_then(|v| v.as_i64())
            .unwrap_or(24);

        let Some(assignee_id) = task.assignee_id else {
            return Ok(json!({ "notified": false, "reason": "no assignee" }));
        };
        let recipient = match self.store.user(assignee_id).await? {
            Some(user) => user,
            None => {
                return Ok(json!({ "notified": false, "reason": "assignee no longer exists" }))
            }
        };
        if !recipient.notification_preferences.deadline_approaching {
            return Ok(json!({ "notified": false, "reason": "preference disabled" }));
        }

        let project_name = self.project_name(task.project_id).await;
        let mut payload = Self::message_payload(
            task.id,
            &task.name,
            &project_name,
            format!("Task {} is due in {}h", task.name, hours_left),
        );
        payload.insert("hours_left".to_string(), hours_left.to_string());
        if let Some(deadline) = task.deadline {
            payload.insert("deadline".to_string(), deadline.to_rfc3339());
        }

        self.dispatch(recipient.id, NotificationKind::DeadlineApproaching, payload)
            .await
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        info!(task_id = task.id, hours_left, "deadline reminder delivered");
        Ok(json!({ "notified": true, "hours_left": hours_left }))
    }

    async fn execute_delayed_action(
        &self,
        scheduled: &ScheduledAction,
    ) -> Result<serde_json::Value> {
        let action_id = scheduled.dependency_action_id.ok_or_else(|| {
            EngineError::internal("delayed_notification row has no dependency action")
        })?;
        let action = self
            .store
            .action(action_id)
            .await?
            .ok_or(EngineError::not_found("dependency action", action_id))?;
        if !action.is_active {
            return Ok(json!({ "result": "skipped", "reason": "action deactivated" }));
        }
        let edge = self.load_dependency(action.dependency_id).await?;
        let actor = self.load_user(edge.created_by).await?;

        let (outcome, completed_target) = self
            .execute_action(&action, &edge, TRIGGER_DELAYED, &actor)
            .await;

        let mut cascade = Vec::new();
        if let Some(task_id) = completed_target {
            cascade = self.run_completion_cascade(task_id, &actor).await;
        }

        let mut merged = scheduled
            .payload
            .clone()
            .unwrap_or_else(|| json!({}));
        if let Some(map) = merged.as_object_mut() {
            map.insert(
                "result".to_string(),
                serde_json::to_value(&outcome)
                    .map_err(|err| EngineError::internal(err.to_string()))?,
            );
            if !cascade.is_empty() {
                map.insert(
                    "cascade".to_string(),
                    serde_json::to_value(&cascade)
                        .map_err(|err| EngineError::internal(err.to_string()))?,
                );
            }
        }
        Ok(merged)
    }
}
