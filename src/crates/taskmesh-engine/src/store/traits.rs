//! The `Store` capability trait
//!
//! Transactional persistence over the engine's data model. Implementations
//! must be `Send + Sync`, enforce the unique indexes listed per method, and
//! keep [`ScheduledAction`] status transitions linearizable per row.
//!
//! Users, projects, and memberships are written by the enclosing system (the
//! engine only reads them); the insert methods exist so that system and the
//! test fixtures go through the same contract.

use crate::models::{
    Dependency, DependencyAction, Event, NewDependency, NewDependencyAction, NewEvent,
    NewMember, NewProject, NewScheduledAction, NewTask, NewUser, NotificationPreferences,
    Project, ProjectMember, ProjectStatus, ScheduledAction, ScheduledKind, ScheduledStatus,
    Task, TaskFilter, User,
};
use crate::store::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // users
    // ------------------------------------------------------------------

    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn user(&self, id: i64) -> StoreResult<Option<User>>;

    async fn update_user_preferences(
        &self,
        id: i64,
        preferences: NotificationPreferences,
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // projects & membership
    // ------------------------------------------------------------------

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project>;

    async fn project(&self, id: i64) -> StoreResult<Option<Project>>;

    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> StoreResult<()>;

    /// Insert or reactivate a membership; unique on `(project, user)`.
    ///
    /// Re-adding a removed member yields a record equivalent to one that was
    /// never removed, apart from audit timestamps.
    async fn upsert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> StoreResult<ProjectMember>;

    async fn member(&self, project_id: i64, user_id: i64)
        -> StoreResult<Option<ProjectMember>>;

    async fn deactivate_member(
        &self,
        project_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // tasks
    // ------------------------------------------------------------------

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task>;

    async fn task(&self, id: i64) -> StoreResult<Option<Task>>;

    /// Full-row write keyed by `task.id`
    async fn update_task(&self, task: &Task) -> StoreResult<()>;

    /// Remove a task with its edges, the edges' actions, its events, and its
    /// scheduled rows
    async fn delete_task(&self, id: i64) -> StoreResult<()>;

    /// Project tasks matching `filter`, ordered by priority descending, then
    /// deadline, then creation time descending
    async fn project_tasks(&self, project_id: i64, filter: TaskFilter)
        -> StoreResult<Vec<Task>>;

    // ------------------------------------------------------------------
    // dependencies
    // ------------------------------------------------------------------

    /// Insert an edge; unique on `(source_task, target_task)`
    async fn insert_dependency(&self, dependency: NewDependency) -> StoreResult<Dependency>;

    async fn dependency(&self, id: i64) -> StoreResult<Option<Dependency>>;

    /// Remove an edge and its actions
    async fn delete_dependency(&self, id: i64) -> StoreResult<()>;

    async fn project_dependencies(&self, project_id: i64) -> StoreResult<Vec<Dependency>>;

    async fn incoming_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>>;

    async fn outgoing_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>>;

    // ------------------------------------------------------------------
    // dependency actions
    // ------------------------------------------------------------------

    async fn insert_action(
        &self,
        action: NewDependencyAction,
    ) -> StoreResult<DependencyAction>;

    async fn action(&self, id: i64) -> StoreResult<Option<DependencyAction>>;

    async fn delete_action(&self, id: i64) -> StoreResult<()>;

    /// Active actions of an edge ordered by `(execute_order, id)`
    async fn active_actions(&self, dependency_id: i64)
        -> StoreResult<Vec<DependencyAction>>;

    // ------------------------------------------------------------------
    // events (append-only)
    // ------------------------------------------------------------------

    async fn append_event(&self, event: NewEvent) -> StoreResult<Event>;

    /// Events of a task in creation order
    async fn task_events(&self, task_id: i64) -> StoreResult<Vec<Event>>;

    // ------------------------------------------------------------------
    // scheduled actions
    // ------------------------------------------------------------------

    async fn insert_scheduled(
        &self,
        scheduled: NewScheduledAction,
    ) -> StoreResult<ScheduledAction>;

    async fn scheduled(&self, id: i64) -> StoreResult<Option<ScheduledAction>>;

    /// Atomically claim up to `limit` pending rows due at `now`, ordered by
    /// `scheduled_for`: the returned rows are already marked `processing`
    /// (same transaction as the select).
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ScheduledAction>>;

    /// Terminal transition of a claimed row; sets `executed_at` and
    /// optionally replaces the payload
    async fn finish_scheduled(
        &self,
        id: i64,
        status: ScheduledStatus,
        executed_at: DateTime<Utc>,
        payload: Option<serde_json::Value>,
    ) -> StoreResult<()>;

    /// Drop pending rows of one kind for a task (deadline rescheduling);
    /// returns how many were cancelled
    async fn cancel_pending(&self, task_id: i64, kind: ScheduledKind) -> StoreResult<u64>;

    /// Sweep `processing` rows claimed before `older_than` back to
    /// `pending`; returns how many were requeued
    async fn requeue_stale(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;

    /// All scheduled rows of a task (newest last); test and inspection aid
    async fn task_scheduled(&self, task_id: i64) -> StoreResult<Vec<ScheduledAction>>;
}
