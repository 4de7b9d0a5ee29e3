//! Task operations
//!
//! Creation, mutation, status transitions, readiness, and the project-level
//! read side. Status transitions that cross into a final status hand off to
//! the action cascade in [`crate::actions`].

use crate::actions::ActionOutcome;
use crate::authz;
use crate::engine::TaskEngine;
use crate::error::EngineError;
use crate::graph::TaskGraph;
use crate::models::{
    task::{MAX_PRIORITY, NAME_MAX_LEN},
    ActionKind, EventType, NewEvent, NewScheduledAction, NewTask, ScheduledKind, Task,
    TaskFilter, TaskStatus, User,
};
use crate::notifier::NotificationKind;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request payload for [`TaskEngine::create_task`]
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub assignee_id: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: u8,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata: Option<String>,
}

impl CreateTask {
    pub fn new(project_id: i64, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            description: None,
            assignee_id: None,
            deadline: None,
            priority: 0,
            position_x: 0.0,
            position_y: 0.0,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assignee(mut self, assignee_id: i64) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn at_position(mut self, x: f64, y: f64) -> Self {
        self.position_x = x;
        self.position_y = y;
        self
    }
}

/// Partial update for [`TaskEngine::update_task`]; unset fields are left
/// untouched. Two-level options distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<Option<i64>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub priority: Option<u8>,
    pub position: Option<(f64, f64)>,
    pub metadata: Option<Option<String>>,
}

impl TaskUpdate {
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn assign(mut self, assignee_id: Option<i64>) -> Self {
        self.assignee = Some(assignee_id);
        self
    }

    pub fn set_deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn set_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }
}

/// Result of a status-change command
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub task: Task,
    pub status_changed: bool,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    pub actions_executed: Vec<ActionOutcome>,
}

/// Internal result of a raw transition write
#[derive(Debug, Clone)]
pub(crate) struct StatusTransition {
    pub task: Task,
    pub old_status: TaskStatus,
    pub changed: bool,
    pub crossed_final: bool,
}

/// Node of a project graph snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub name: String,
    pub status: TaskStatus,
    pub status_color: &'static str,
    pub assignee_id: Option<i64>,
    pub creator_id: i64,
    pub priority: u8,
    pub deadline: Option<DateTime<Utc>>,
    pub is_ready: bool,
    pub position_x: f64,
    pub position_y: f64,
}

/// Edge of a project graph snapshot, with its active action summary
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub id: i64,
    pub source: i64,
    pub target: i64,
    pub dependency_type: String,
    pub description: Option<String>,
    pub actions: Vec<(ActionKind, u32)>,
}

/// Full project graph with computed readiness
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Aggregate task numbers for a project
#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub by_status: HashMap<TaskStatus, usize>,
    pub overdue: usize,
}

impl TaskEngine {
    /// Create a task in `todo` (or the project's configured default status).
    ///
    /// Requires `can_create_tasks`. Schedules deadline reminders when a
    /// deadline is set.
    pub async fn create_task(&self, actor_id: i64, req: CreateTask) -> Result<Task> {
        let actor = self.load_user(actor_id).await?;
        let project = self.load_project(req.project_id).await?;
        if !project.is_active() {
            return Err(EngineError::validation("project is not active"));
        }
        let role = self.active_role(actor_id, project.id).await?;
        if !authz::can_create_tasks(&actor, role.as_ref()) {
            return Err(EngineError::forbidden(
                "no permission to create tasks in this project",
            ));
        }

        let name = req.name.trim().to_string();
        if name.is_empty() || name.chars().count() > NAME_MAX_LEN {
            return Err(EngineError::validation(format!(
                "task name must be 1..={} characters",
                NAME_MAX_LEN
            )));
        }
        if req.priority > MAX_PRIORITY {
            return Err(EngineError::validation(format!(
                "priority must be 0..={}",
                MAX_PRIORITY
            )));
        }
        if let Some(assignee_id) = req.assignee_id {
            let member = self.store.member(project.id, assignee_id).await?;
            if !member.is_some_and(|m| m.is_active) {
                return Err(EngineError::validation(
                    "assignee must be an active project member",
                ));
            }
        }

        let lock = self.project_lock(project.id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let new_task = NewTask {
            project_id: project.id,
            name,
            description,
            status: project.settings.default_task_status,
            assignee_id: req.assignee_id,
            creator_id: actor.id,
            deadline: req.deadline,
            priority: req.priority,
            position_x: req.position_x,
            position_y: req.position_y,
            metadata: req.metadata,
            created_at: now,
        };

        let task = {
            let store = Arc::clone(&self.store);
            self.retry(move || {
                let store = Arc::clone(&store);
                let payload = new_task.clone();
                async move { store.insert_task(payload).await }
            })
            .await?
        };

        self.store
            .append_event(NewEvent::new(
                project.id,
                task.id,
                actor.id,
                EventType::Created,
                now,
            ))
            .await?;

        self.schedule_deadline_reminders(&task).await?;

        info!(task_id = task.id, project_id = project.id, "task created");
        Ok(task)
    }

    /// Apply a partial update. Requires `can_edit_task`; writes one `updated`
    /// event per changed field and an `assignee_changed` event (plus a gated
    /// `task_assigned` notification) on reassignment.
    pub async fn update_task(
        &self,
        task_id: i64,
        actor_id: i64,
        update: TaskUpdate,
    ) -> Result<Task> {
        let actor = self.load_user(actor_id).await?;
        let mut task = self.load_task(task_id).await?;
        let role = self.active_role(actor_id, task.project_id).await?;
        if !authz::can_edit_task(&actor, role.as_ref(), &task) {
            return Err(EngineError::forbidden("no permission to edit this task"));
        }

        let lock = self.project_lock(task.project_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut changes: Vec<(&'static str, Option<String>, Option<String>)> = Vec::new();
        let mut assignee_change: Option<(Option<i64>, Option<i64>)> = None;
        let mut deadline_changed = false;
        let mut moved = false;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() || name.chars().count() > NAME_MAX_LEN {
                return Err(EngineError::validation(format!(
                    "task name must be 1..={} characters",
                    NAME_MAX_LEN
                )));
            }
            if name != task.name {
                changes.push(("name", Some(task.name.clone()), Some(name.clone())));
                task.name = name;
            }
        }

        if let Some(description) = update.description {
            let value = {
                let trimmed = description.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            };
            if value != task.description {
                changes.push(("description", task.description.clone(), value.clone()));
                task.description = value;
            }
        }

        if let Some(assignee) = update.assignee {
            if assignee != task.assignee_id {
                if let Some(assignee_id) = assignee {
                    let member = self.store.member(task.project_id, assignee_id).await?;
                    if !member.is_some_and(|m| m.is_active) {
                        return Err(EngineError::validation(
                            "assignee must be an active project member",
                        ));
                    }
                }
                assignee_change = Some((task.assignee_id, assignee));
                task.assignee_id = assignee;
            }
        }

        if let Some(deadline) = update.deadline {
            if deadline != task.deadline {
                changes.push((
                    "deadline",
                    task.deadline.map(|d| d.to_rfc3339()),
                    deadline.map(|d| d.to_rfc3339()),
                ));
                task.deadline = deadline;
                deadline_changed = true;
            }
        }

        if let Some(priority) = update.priority {
            if priority > MAX_PRIORITY {
                return Err(EngineError::validation(format!(
                    "priority must be 0..={}",
                    MAX_PRIORITY
                )));
            }
            if priority != task.priority {
                changes.push((
                    "priority",
                    Some(task.priority.to_string()),
                    Some(priority.to_string()),
                ));
                task.priority = priority;
            }
        }

        if let Some((x, y)) = update.position {
            if (x, y) != (task.position_x, task.position_y) {
                task.position_x = x;
                task.position_y = y;
                moved = true;
            }
        }

        if let Some(metadata) = update.metadata {
            if metadata != task.metadata {
                changes.push(("metadata", task.metadata.clone(), metadata.clone()));
                task.metadata = metadata;
            }
        }

        if changes.is_empty() && assignee_change.is_none() && !moved {
            debug!(task_id, "update is a no-op");
            return Ok(task);
        }

        task.updated_at = now;
        {
            let store = Arc::clone(&self.store);
            let row = task.clone();
            self.retry(move || {
                let store = Arc::clone(&store);
                let row = row.clone();
                async move { store.update_task(&row).await }
            })
            .await?;
        }

        for (field, old_value, new_value) in changes {
            self.store
                .append_event(
                    NewEvent::new(task.project_id, task.id, actor.id, EventType::Updated, now)
                        .with_values(old_value, new_value)
                        .with_metadata(json!({ "field": field })),
                )
                .await?;
        }

        if let Some((old_assignee, new_assignee)) = assignee_change {
            let old_name = self.username_or_unknown(old_assignee).await;
            let new_name = self.username_or_unknown(new_assignee).await;
            self.store
                .append_event(
                    NewEvent::new(
                        task.project_id,
                        task.id,
                        actor.id,
                        EventType::AssigneeChanged,
                        now,
                    )
                    .with_values(Some(old_name), Some(new_name.clone())),
                )
                .await?;

            if let Some(new_id) = new_assignee {
                self.notify_assignment(&task, new_id).await;
            }
        }

        if deadline_changed {
            self.store
                .cancel_pending(task.id, ScheduledKind::DeadlineApproaching)
                .await?;
            self.schedule_deadline_reminders(&task).await?;
        }

        info!(task_id = task.id, "task updated");
        Ok(task)
    }

    /// Delete a task together with its edges, events, and scheduled rows.
    /// Requires `can_delete_task`.
    pub async fn delete_task(&self, task_id: i64, actor_id: i64) -> Result<()> {
        let actor = self.load_user(actor_id).await?;
        let task = self.load_task(task_id).await?;
        let role = self.active_role(actor_id, task.project_id).await?;
        if !authz::can_delete_task(&actor, role.as_ref(), &task) {
            return Err(EngineError::forbidden("no permission to delete this task"));
        }

        let lock = self.project_lock(task.project_id);
        let _guard = lock.lock().await;

        self.store.delete_task(task_id).await?;
        info!(task_id, project_id = task.project_id, "task deleted");
        Ok(())
    }

    /// Change a task's status.
    ///
    /// Any non-final status may move anywhere; leaving a final status
    /// (reopening) additionally requires `edit_any_task`. A same-status call
    /// is a no-op. Crossing into a final status runs the action cascade over
    /// outgoing edges; the returned record carries every action outcome.
    pub async fn change_task_status(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor_id: i64,
    ) -> Result<StatusChange> {
        let actor = self.load_user(actor_id).await?;
        let task = self.load_task(task_id).await?;
        let role = self.active_role(actor_id, task.project_id).await?;
        if !authz::can_edit_task(&actor, role.as_ref(), &task) {
            return Err(EngineError::forbidden(
                "no permission to change this task's status",
            ));
        }

        let old_status = task.status;
        if old_status == new_status {
            debug!(task_id, status = %new_status, "status unchanged");
            return Ok(StatusChange {
                task,
                status_changed: false,
                old_status,
                new_status,
                actions_executed: Vec::new(),
            });
        }

        if old_status.is_final() && !new_status.is_final() {
            let may_reopen = authz::is_superuser(&actor)
                || role.as_ref().is_some_and(|r| r.can_edit_any_task);
            if !may_reopen {
                return Err(EngineError::forbidden(
                    "reopening a completed task requires edit_any_task",
                ));
            }
        }

        let lock = self.project_lock(task.project_id);
        let _guard = lock.lock().await;

        let transition = self
            .apply_status_transition(task_id, new_status, &actor, None)
            .await?;
        info!(
            task_id,
            from = %old_status,
            to = %new_status,
            "task status changed"
        );

        let actions_executed = if transition.crossed_final {
            self.run_completion_cascade(task_id, &actor).await
        } else {
            Vec::new()
        };

        Ok(StatusChange {
            task: transition.task,
            status_changed: true,
            old_status,
            new_status,
            actions_executed,
        })
    }

    /// Raw transition write shared by the public command and the evaluator's
    /// `change_status` actions: stamps first-time timestamps, persists, and
    /// appends the `status_changed` event. No AuthZ, no cascade.
    pub(crate) async fn apply_status_transition(
        &self,
        task_id: i64,
        new_status: TaskStatus,
        actor: &User,
        metadata: Option<serde_json::Value>,
    ) -> Result<StatusTransition> {
        let mut task = self.load_task(task_id).await?;
        let old_status = task.status;
        if old_status == new_status {
            return Ok(StatusTransition {
                task,
                old_status,
                changed: false,
                crossed_final: false,
            });
        }

        let now = self.clock.now();
        task.apply_status(new_status, now);

        {
            let store = Arc::clone(&self.store);
            let row = task.clone();
            self.retry(move || {
                let store = Arc::clone(&store);
                let row = row.clone();
                async move { store.update_task(&row).await }
            })
            .await?;
        }

        let mut event = NewEvent::new(
            task.project_id,
            task.id,
            actor.id,
            EventType::StatusChanged,
            now,
        )
        .with_values(
            Some(old_status.as_str().to_string()),
            Some(new_status.as_str().to_string()),
        );
        if let Some(metadata) = metadata {
            event = event.with_metadata(metadata);
        }
        self.store.append_event(event).await?;

        Ok(StatusTransition {
            task,
            old_status,
            changed: true,
            crossed_final: !old_status.is_final() && new_status.is_final(),
        })
    }

    /// Readiness: `todo`, and every incoming edge's source is `completed`.
    pub async fn is_ready(&self, task_id: i64) -> Result<bool> {
        let task = self.load_task(task_id).await?;
        if task.status != TaskStatus::Todo {
            return Ok(false);
        }
        let incoming = self.store.incoming_dependencies(task.id).await?;
        for edge in incoming {
            let source = self.load_task(edge.source_task_id).await?;
            if source.status != TaskStatus::Completed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // read side
    // ------------------------------------------------------------------

    /// Project tasks matching the filter
    pub async fn list_project_tasks(
        &self,
        project_id: i64,
        filter: TaskFilter,
    ) -> Result<Vec<Task>> {
        self.load_project(project_id).await?;
        Ok(self.store.project_tasks(project_id, filter).await?)
    }

    /// Incoming and outgoing edges of a task
    pub async fn task_dependencies(
        &self,
        task_id: i64,
    ) -> Result<(Vec<crate::models::Dependency>, Vec<crate::models::Dependency>)> {
        self.load_task(task_id).await?;
        let incoming = self.store.incoming_dependencies(task_id).await?;
        let outgoing = self.store.outgoing_dependencies(task_id).await?;
        Ok((incoming, outgoing))
    }

    /// Full project graph with per-node readiness and per-edge action
    /// summaries
    pub async fn project_graph(&self, project_id: i64) -> Result<GraphSnapshot> {
        self.load_project(project_id).await?;
        let tasks = self
            .store
            .project_tasks(project_id, TaskFilter::default())
            .await?;
        let graph = TaskGraph::load(self.store.as_ref(), project_id).await?;
        let statuses: HashMap<i64, TaskStatus> =
            tasks.iter().map(|t| (t.id, t.status)).collect();

        let nodes = tasks
            .iter()
            .map(|task| GraphNode {
                id: task.id,
                name: task.name.clone(),
                status: task.status,
                status_color: task.status.color(),
                assignee_id: task.assignee_id,
                creator_id: task.creator_id,
                priority: task.priority,
                deadline: task.deadline,
                is_ready: graph.is_ready(task, |id| statuses.get(&id).copied()),
                position_x: task.position_x,
                position_y: task.position_y,
            })
            .collect();

        let mut edges = Vec::with_capacity(graph.edge_count());
        for dep in self.store.project_dependencies(project_id).await? {
            let actions = self
                .store
                .active_actions(dep.id)
                .await?
                .into_iter()
                .map(|a| (a.kind, a.delay_minutes))
                .collect();
            edges.push(GraphEdge {
                id: dep.id,
                source: dep.source_task_id,
                target: dep.target_task_id,
                dependency_type: dep.dependency_type,
                description: dep.description,
                actions,
            });
        }

        Ok(GraphSnapshot { nodes, edges })
    }

    /// Topological order over all project tasks (isolated tasks included)
    pub async fn project_topological_order(&self, project_id: i64) -> Result<Vec<i64>> {
        self.load_project(project_id).await?;
        let tasks = self
            .store
            .project_tasks(project_id, TaskFilter::default())
            .await?;
        let graph = TaskGraph::load(self.store.as_ref(), project_id).await?;
        let adjacency = graph.to_adjacency(tasks.iter().map(|t| t.id));
        let order = taskmesh_graph::algorithms::topological_sort(&adjacency).map_err(|_| {
            EngineError::internal("project dependency set is cyclic, invariant broken")
        })?;
        // vertices entered as i64 task ids, so the narrowing is lossless
        Ok(order.into_iter().map(|v| v as i64).collect())
    }

    /// Aggregate status counts and overdue total for a project
    pub async fn project_task_stats(&self, project_id: i64) -> Result<TaskStats> {
        self.load_project(project_id).await?;
        let tasks = self
            .store
            .project_tasks(project_id, TaskFilter::default())
            .await?;
        let now = self.clock.now();
        let mut by_status: HashMap<TaskStatus, usize> = HashMap::new();
        let mut overdue = 0;
        for task in &tasks {
            *by_status.entry(task.status).or_insert(0) += 1;
            if task.is_overdue(now) {
                overdue += 1;
            }
        }
        Ok(TaskStats {
            total: tasks.len(),
            by_status,
            overdue,
        })
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    /// Queue deadline reminders for the configured offsets, skipping any
    /// that would fire in the past.
    pub(crate) async fn schedule_deadline_reminders(&self, task: &Task) -> Result<()> {
        let Some(deadline) = task.deadline else {
            return Ok(());
        };
        let now = self.clock.now();
        for &hours in &self.config.deadline_reminder_hours {
            let notify_at = deadline - Duration::hours(hours);
            if notify_at <= now {
                debug!(task_id = task.id, hours, "reminder in the past, skipped");
                continue;
            }
            self.store
                .insert_scheduled(NewScheduledAction {
                    project_id: task.project_id,
                    task_id: task.id,
                    kind: ScheduledKind::DeadlineApproaching,
                    scheduled_for: notify_at,
                    payload: Some(json!({ "hours_before": hours })),
                    dependency_action_id: None,
                    created_at: now,
                })
                .await?;
        }
        Ok(())
    }

    /// Gated `task_assigned` notification; failures are logged, not raised.
    async fn notify_assignment(&self, task: &Task, assignee_id: i64) {
        let recipient = match self.store.user(assignee_id).await {
            Ok(Some(user)) => user,
            _ => return,
        };
        if !recipient.notification_preferences.task_assigned {
            return;
        }
        let project_name = self.project_name(task.project_id).await;
        let payload = HashMap::from([
            ("task_id".to_string(), task.id.to_string()),
            ("task_name".to_string(), task.name.clone()),
            ("project_name".to_string(), project_name),
            (
                "message".to_string(),
                format!("You were assigned to task {}", task.name),
            ),
        ]);
        if let Err(err) = self
            .dispatch(recipient.id, NotificationKind::TaskAssigned, payload)
            .await
        {
            warn!(task_id = task.id, error = %err, "assignment notification failed");
        }
    }
}
