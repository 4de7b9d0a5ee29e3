//! In-memory store for development and testing
//!
//! Reference implementation of the [`Store`] trait over a single
//! `Arc<RwLock<..>>`. The one write lock makes every mutation serializable,
//! which covers the per-project serializability the engine requires; data is
//! lost on restart. Includes `clear()` and row counters for test isolation.

use crate::models::{
    Dependency, DependencyAction, Event, NewDependency, NewDependencyAction, NewEvent,
    NewMember, NewProject, NewScheduledAction, NewTask, NewUser, NotificationPreferences,
    Project, ProjectMember, ProjectStatus, ScheduledAction, ScheduledKind, ScheduledStatus,
    Task, TaskFilter, User,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    users: HashMap<i64, User>,
    projects: HashMap<i64, Project>,
    members: HashMap<i64, ProjectMember>,
    tasks: HashMap<i64, Task>,
    dependencies: HashMap<i64, Dependency>,
    actions: HashMap<i64, DependencyAction>,
    events: Vec<Event>,
    scheduled: HashMap<i64, ScheduledAction>,
    // claim instants of processing rows, for the reaper
    claims: HashMap<i64, DateTime<Utc>>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Thread-safe in-memory [`Store`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all rows (test isolation)
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }

    /// Total number of stored tasks
    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    /// Total number of stored dependencies
    pub async fn dependency_count(&self) -> usize {
        self.inner.read().await.dependencies.len()
    }

    /// Total number of logged events
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let row = User {
            id,
            username: user.username,
            is_superuser: user.is_superuser,
            is_active: true,
            notification_preferences: user.notification_preferences,
        };
        inner.users.insert(id, row.clone());
        Ok(row)
    }

    async fn user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn update_user_preferences(
        &self,
        id: i64,
        preferences: NotificationPreferences,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("user id={}", id)))?;
        user.notification_preferences = preferences;
        Ok(())
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let mut inner = self.inner.write().await;
        if inner.projects.values().any(|p| p.slug == project.slug) {
            return Err(StoreError::constraint(format!(
                "project slug {:?} already exists",
                project.slug
            )));
        }
        let id = inner.next_id();
        let now = Utc::now();
        let row = Project {
            id,
            name: project.name,
            slug: project.slug,
            status: ProjectStatus::Active,
            settings: project.settings,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        inner.projects.insert(id, row.clone());
        Ok(row)
    }

    async fn project(&self, id: i64) -> StoreResult<Option<Project>> {
        Ok(self.inner.read().await.projects.get(&id).cloned())
    }

    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("project id={}", id)))?;
        project.status = status;
        if status == ProjectStatus::Archived {
            project.archived_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> StoreResult<ProjectMember> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .members
            .values_mut()
            .find(|m| m.project_id == member.project_id && m.user_id == member.user_id)
        {
            existing.role = member.role;
            existing.is_active = true;
            existing.joined_at = now;
            existing.left_at = None;
            return Ok(existing.clone());
        }
        let id = inner.next_id();
        let row = ProjectMember {
            id,
            project_id: member.project_id,
            user_id: member.user_id,
            role: member.role,
            is_active: true,
            joined_at: now,
            left_at: None,
        };
        inner.members.insert(id, row.clone());
        Ok(row)
    }

    async fn member(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> StoreResult<Option<ProjectMember>> {
        Ok(self
            .inner
            .read()
            .await
            .members
            .values()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .cloned())
    }

    async fn deactivate_member(
        &self,
        project_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let member = inner
            .members
            .values_mut()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .ok_or_else(|| {
                StoreError::not_found(format!(
                    "member project={} user={}",
                    project_id, user_id
                ))
            })?;
        member.is_active = false;
        member.left_at = Some(now);
        Ok(())
    }

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let row = Task {
            id,
            project_id: task.project_id,
            name: task.name,
            description: task.description,
            status: task.status,
            assignee_id: task.assignee_id,
            creator_id: task.creator_id,
            created_at: task.created_at,
            updated_at: task.created_at,
            started_at: None,
            completed_at: None,
            deadline: task.deadline,
            priority: task.priority,
            position_x: task.position_x,
            position_y: task.position_y,
            metadata: task.metadata,
        };
        inner.tasks.insert(id, row.clone());
        Ok(row)
    }

    async fn task(&self, id: i64) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&task.id) {
            return Err(StoreError::not_found(format!("task id={}", task.id)));
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.tasks.remove(&id).is_none() {
            return Err(StoreError::not_found(format!("task id={}", id)));
        }
        let edge_ids: Vec<i64> = inner
            .dependencies
            .values()
            .filter(|d| d.source_task_id == id || d.target_task_id == id)
            .map(|d| d.id)
            .collect();
        for edge_id in &edge_ids {
            inner.dependencies.remove(edge_id);
        }
        inner
            .actions
            .retain(|_, a| !edge_ids.contains(&a.dependency_id));
        inner.events.retain(|e| e.task_id != id);
        inner.scheduled.retain(|_, s| s.task_id != id);
        Ok(())
    }

    async fn project_tasks(
        &self,
        project_id: i64,
        filter: TaskFilter,
    ) -> StoreResult<Vec<Task>> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.project_id == project_id && filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| match (a.deadline, b.deadline) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        let tasks: Vec<Task> = tasks.into_iter().skip(filter.offset).collect();
        match filter.limit {
            Some(limit) => Ok(tasks.into_iter().take(limit).collect()),
            None => Ok(tasks),
        }
    }

    async fn insert_dependency(
        &self,
        dependency: NewDependency,
    ) -> StoreResult<Dependency> {
        let mut inner = self.inner.write().await;
        if inner.dependencies.values().any(|d| {
            d.source_task_id == dependency.source_task_id
                && d.target_task_id == dependency.target_task_id
        }) {
            return Err(StoreError::constraint(format!(
                "dependency {} -> {} already exists",
                dependency.source_task_id, dependency.target_task_id
            )));
        }
        let id = inner.next_id();
        let row = Dependency {
            id,
            project_id: dependency.project_id,
            source_task_id: dependency.source_task_id,
            target_task_id: dependency.target_task_id,
            dependency_type: dependency.dependency_type,
            description: dependency.description,
            created_by: dependency.created_by,
            created_at: Utc::now(),
        };
        inner.dependencies.insert(id, row.clone());
        Ok(row)
    }

    async fn dependency(&self, id: i64) -> StoreResult<Option<Dependency>> {
        Ok(self.inner.read().await.dependencies.get(&id).cloned())
    }

    async fn delete_dependency(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.dependencies.remove(&id).is_none() {
            return Err(StoreError::not_found(format!("dependency id={}", id)));
        }
        inner.actions.retain(|_, a| a.dependency_id != id);
        Ok(())
    }

    async fn project_dependencies(&self, project_id: i64) -> StoreResult<Vec<Dependency>> {
        let inner = self.inner.read().await;
        let mut deps: Vec<Dependency> = inner
            .dependencies
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        deps.sort_by_key(|d| d.id);
        Ok(deps)
    }

    async fn incoming_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>> {
        let inner = self.inner.read().await;
        let mut deps: Vec<Dependency> = inner
            .dependencies
            .values()
            .filter(|d| d.target_task_id == task_id)
            .cloned()
            .collect();
        deps.sort_by_key(|d| d.id);
        Ok(deps)
    }

    async fn outgoing_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>> {
        let inner = self.inner.read().await;
        let mut deps: Vec<Dependency> = inner
            .dependencies
            .values()
            .filter(|d| d.source_task_id == task_id)
            .cloned()
            .collect();
        deps.sort_by_key(|d| d.id);
        Ok(deps)
    }

    async fn insert_action(
        &self,
        action: NewDependencyAction,
    ) -> StoreResult<DependencyAction> {
        let mut inner = self.inner.write().await;
        if !inner.dependencies.contains_key(&action.dependency_id) {
            return Err(StoreError::not_found(format!(
                "dependency id={}",
                action.dependency_id
            )));
        }
        let id = inner.next_id();
        let row = DependencyAction {
            id,
            dependency_id: action.dependency_id,
            kind: action.kind,
            target_user_id: action.target_user_id,
            target_status: action.target_status,
            message_template: action.message_template,
            delay_minutes: action.delay_minutes,
            execute_order: action.execute_order,
            is_active: true,
        };
        inner.actions.insert(id, row.clone());
        Ok(row)
    }

    async fn action(&self, id: i64) -> StoreResult<Option<DependencyAction>> {
        Ok(self.inner.read().await.actions.get(&id).cloned())
    }

    async fn delete_action(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.actions.remove(&id).is_none() {
            return Err(StoreError::not_found(format!("action id={}", id)));
        }
        Ok(())
    }

    async fn active_actions(
        &self,
        dependency_id: i64,
    ) -> StoreResult<Vec<DependencyAction>> {
        let inner = self.inner.read().await;
        let mut actions: Vec<DependencyAction> = inner
            .actions
            .values()
            .filter(|a| a.dependency_id == dependency_id && a.is_active)
            .cloned()
            .collect();
        actions.sort_by_key(|a| (a.execute_order, a.id));
        Ok(actions)
    }

    async fn append_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let row = Event {
            id,
            project_id: event.project_id,
            task_id: event.task_id,
            user_id: event.user_id,
            event_type: event.event_type,
            old_value: event.old_value,
            new_value: event.new_value,
            metadata: event.metadata,
            created_at: event.created_at,
        };
        inner.events.push(row.clone());
        Ok(row)
    }

    async fn task_events(&self, task_id: i64) -> StoreResult<Vec<Event>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn insert_scheduled(
        &self,
        scheduled: NewScheduledAction,
    ) -> StoreResult<ScheduledAction> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let row = ScheduledAction {
            id,
            project_id: scheduled.project_id,
            task_id: scheduled.task_id,
            kind: scheduled.kind,
            scheduled_for: scheduled.scheduled_for,
            executed_at: None,
            payload: scheduled.payload,
            dependency_action_id: scheduled.dependency_action_id,
            status: ScheduledStatus::Pending,
            created_at: scheduled.created_at,
        };
        inner.scheduled.insert(id, row.clone());
        Ok(row)
    }

    async fn scheduled(&self, id: i64) -> StoreResult<Option<ScheduledAction>> {
        Ok(self.inner.read().await.scheduled.get(&id).cloned())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ScheduledAction>> {
        let mut inner = self.inner.write().await;
        let mut due: Vec<i64> = inner
            .scheduled
            .values()
            .filter(|s| s.status == ScheduledStatus::Pending && s.scheduled_for <= now)
            .map(|s| s.id)
            .collect();
        due.sort_by_key(|id| {
            let row = &inner.scheduled[id];
            (row.scheduled_for, row.id)
        });
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            let row = inner
                .scheduled
                .get_mut(&id)
                .expect("claimed id present under write lock");
            row.status = ScheduledStatus::Processing;
            claimed.push(row.clone());
            inner.claims.insert(id, now);
        }
        Ok(claimed)
    }

    async fn finish_scheduled(
        &self,
        id: i64,
        status: ScheduledStatus,
        executed_at: DateTime<Utc>,
        payload: Option<serde_json::Value>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let row = inner
            .scheduled
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("scheduled id={}", id)))?;
        row.status = status;
        row.executed_at = Some(executed_at);
        if let Some(payload) = payload {
            row.payload = Some(payload);
        }
        inner.claims.remove(&id);
        Ok(())
    }

    async fn cancel_pending(&self, task_id: i64, kind: ScheduledKind) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.scheduled.len();
        inner.scheduled.retain(|_, s| {
            !(s.task_id == task_id
                && s.kind == kind
                && s.status == ScheduledStatus::Pending)
        });
        Ok((before - inner.scheduled.len()) as u64)
    }

    async fn requeue_stale(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let stale: Vec<i64> = inner
            .claims
            .iter()
            .filter(|(_, &claimed_at)| claimed_at <= older_than)
            .map(|(&id, _)| id)
            .collect();
        let mut requeued = 0;
        for id in stale {
            if let Some(row) = inner.scheduled.get_mut(&id) {
                if row.status == ScheduledStatus::Processing {
                    row.status = ScheduledStatus::Pending;
                    requeued += 1;
                }
            }
            inner.claims.remove(&id);
        }
        Ok(requeued)
    }

    async fn task_scheduled(&self, task_id: i64) -> StoreResult<Vec<ScheduledAction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ScheduledAction> = inner
            .scheduled
            .values()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.id);
        Ok(rows)
    }
}
