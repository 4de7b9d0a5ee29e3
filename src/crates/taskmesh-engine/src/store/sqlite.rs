//! SQLite-backed store
//!
//! Implements [`Store`] over an `sqlx` connection pool. Timestamps are
//! RFC 3339 TEXT columns (fixed microsecond precision so lexicographic order
//! matches chronological order); enums are stored by their string codes;
//! role, preference, and settings bundles are JSON columns. The schema is
//! embedded and applied on connect.

use crate::models::{
    ActionKind, Dependency, DependencyAction, Event, EventType, NewDependency,
    NewDependencyAction, NewEvent, NewMember, NewProject, NewScheduledAction, NewTask,
    NewUser, NotificationPreferences, Project, ProjectMember, ProjectRole, ProjectSettings,
    ProjectStatus, ScheduledAction, ScheduledKind, ScheduledStatus, Task, TaskFilter,
    TaskStatus, User,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::Store;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

/// Embedded schema, applied statement by statement on connect
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        is_superuser INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        notification_preferences TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'active',
        settings TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        archived_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS project_members (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        joined_at TEXT NOT NULL,
        left_at TEXT,
        UNIQUE (project_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        assignee_id INTEGER,
        creator_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        deadline TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        position_x REAL NOT NULL DEFAULT 0,
        position_y REAL NOT NULL DEFAULT 0,
        metadata TEXT,
        UNIQUE (project_id, id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project_status
        ON tasks (project_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project_deadline
        ON tasks (project_id, deadline)",
    "CREATE TABLE IF NOT EXISTS task_dependencies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        source_task_id INTEGER NOT NULL,
        target_task_id INTEGER NOT NULL,
        dependency_type TEXT NOT NULL DEFAULT 'simple',
        description TEXT,
        created_by INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (source_task_id, target_task_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_project_source
        ON task_dependencies (project_id, source_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_project_target
        ON task_dependencies (project_id, target_task_id)",
    "CREATE TABLE IF NOT EXISTS dependency_actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dependency_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        target_user_id INTEGER,
        target_status TEXT,
        message_template TEXT,
        delay_minutes INTEGER NOT NULL DEFAULT 0,
        execute_order INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS idx_actions_dependency_order
        ON dependency_actions (dependency_id, execute_order)",
    "CREATE TABLE IF NOT EXISTS task_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        task_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        metadata TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_task_created
        ON task_events (task_id, created_at)",
    "CREATE TABLE IF NOT EXISTS scheduled_actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        task_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        scheduled_for TEXT NOT NULL,
        executed_at TEXT,
        payload TEXT,
        dependency_action_id INTEGER,
        status TEXT NOT NULL DEFAULT 'pending',
        claimed_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_scheduled_due_status
        ON scheduled_actions (scheduled_for, status)",
];

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::decode(format!("bad timestamp {:?}: {}", raw, e)))
}

fn parse_ts_opt(raw: &Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> StoreResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::decode(format!("bad {} json: {}", what, e)))
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::decode(format!("cannot encode {}: {}", what, e)))
}

// ----------------------------------------------------------------------
// row types
// ----------------------------------------------------------------------

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    is_superuser: i64,
    is_active: i64,
    notification_preferences: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<User> {
        Ok(User {
            id: row.id,
            username: row.username,
            is_superuser: row.is_superuser != 0,
            is_active: row.is_active != 0,
            notification_preferences: parse_json(
                &row.notification_preferences,
                "notification preferences",
            )?,
        })
    }
}

#[derive(FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    slug: String,
    status: String,
    settings: String,
    created_at: String,
    updated_at: String,
    archived_at: Option<String>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> StoreResult<Project> {
        Ok(Project {
            id: row.id,
            name: row.name,
            status: ProjectStatus::parse(&row.status).ok_or_else(|| {
                StoreError::decode(format!("unknown project status {:?}", row.status))
            })?,
            settings: parse_json::<ProjectSettings>(&row.settings, "project settings")?,
            slug: row.slug,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            archived_at: parse_ts_opt(&row.archived_at)?,
        })
    }
}

#[derive(FromRow)]
struct MemberRow {
    id: i64,
    project_id: i64,
    user_id: i64,
    role: String,
    is_active: i64,
    joined_at: String,
    left_at: Option<String>,
}

impl TryFrom<MemberRow> for ProjectMember {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> StoreResult<ProjectMember> {
        Ok(ProjectMember {
            id: row.id,
            project_id: row.project_id,
            user_id: row.user_id,
            role: parse_json::<ProjectRole>(&row.role, "member role")?,
            is_active: row.is_active != 0,
            joined_at: parse_ts(&row.joined_at)?,
            left_at: parse_ts_opt(&row.left_at)?,
        })
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    project_id: i64,
    name: String,
    description: Option<String>,
    status: String,
    assignee_id: Option<i64>,
    creator_id: i64,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    deadline: Option<String>,
    priority: i64,
    position_x: f64,
    position_y: f64,
    metadata: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> StoreResult<Task> {
        Ok(Task {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            status: TaskStatus::parse(&row.status).ok_or_else(|| {
                StoreError::decode(format!("unknown task status {:?}", row.status))
            })?,
            assignee_id: row.assignee_id,
            creator_id: row.creator_id,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            started_at: parse_ts_opt(&row.started_at)?,
            completed_at: parse_ts_opt(&row.completed_at)?,
            deadline: parse_ts_opt(&row.deadline)?,
            priority: row.priority as u8,
            position_x: row.position_x,
            position_y: row.position_y,
            metadata: row.metadata,
        })
    }
}

#[derive(FromRow)]
struct DependencyRow {
    id: i64,
    project_id: i64,
    source_task_id: i64,
    target_task_id: i64,
    dependency_type: String,
    description: Option<String>,
    created_by: i64,
    created_at: String,
}

impl TryFrom<DependencyRow> for Dependency {
    type Error = StoreError;

    fn try_from(row: DependencyRow) -> StoreResult<Dependency> {
        Ok(Dependency {
            id: row.id,
            project_id: row.project_id,
            source_task_id: row.source_task_id,
            target_task_id: row.target_task_id,
            dependency_type: row.dependency_type,
            description: row.description,
            created_by: row.created_by,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct ActionRow {
    id: i64,
    dependency_id: i64,
    kind: String,
    target_user_id: Option<i64>,
    target_status: Option<String>,
    message_template: Option<String>,
    delay_minutes: i64,
    execute_order: i64,
    is_active: i64,
}

impl TryFrom<ActionRow> for DependencyAction {
    type Error = StoreError;

    fn try_from(row: ActionRow) -> StoreResult<DependencyAction> {
        let target_status = row
            .target_status
            .as_deref()
            .map(|s| {
                TaskStatus::parse(s).ok_or_else(|| {
                    StoreError::decode(format!("unknown target status {:?}", s))
                })
            })
            .transpose()?;
        Ok(DependencyAction {
            id: row.id,
            dependency_id: row.dependency_id,
            kind: ActionKind::parse(&row.kind).ok_or_else(|| {
                StoreError::decode(format!("unknown action kind {:?}", row.kind))
            })?,
            target_user_id: row.target_user_id,
            target_status,
            message_template: row.message_template,
            delay_minutes: row.delay_minutes as u32,
            execute_order: row.execute_order as i32,
            is_active: row.is_active != 0,
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    id: i64,
    project_id: i64,
    task_id: i64,
    user_id: i64,
    event_type: String,
    old_value: Option<String>,
    new_value: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> StoreResult<Event> {
        let metadata = row
            .metadata
            .as_deref()
            .map(|raw| parse_json::<serde_json::Value>(raw, "event metadata"))
            .transpose()?;
        Ok(Event {
            id: row.id,
            project_id: row.project_id,
            task_id: row.task_id,
            user_id: row.user_id,
            event_type: EventType::parse(&row.event_type).ok_or_else(|| {
                StoreError::decode(format!("unknown event type {:?}", row.event_type))
            })?,
            old_value: row.old_value,
            new_value: row.new_value,
            metadata,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct ScheduledRow {
    id: i64,
    project_id: i64,
    task_id: i64,
    kind: String,
    scheduled_for: String,
    executed_at: Option<String>,
    payload: Option<String>,
    dependency_action_id: Option<i64>,
    status: String,
    created_at: String,
}

impl TryFrom<ScheduledRow> for ScheduledAction {
    type Error = StoreError;

    fn try_from(row: ScheduledRow) -> StoreResult<ScheduledAction> {
        let payload = row
            .payload
            .as_deref()
            .map(|raw| parse_json::<serde_json::Value>(raw, "scheduled payload"))
            .transpose()?;
        Ok(ScheduledAction {
            id: row.id,
            project_id: row.project_id,
            task_id: row.task_id,
            kind: ScheduledKind::parse(&row.kind).ok_or_else(|| {
                StoreError::decode(format!("unknown scheduled kind {:?}", row.kind))
            })?,
            scheduled_for: parse_ts(&row.scheduled_for)?,
            executed_at: parse_ts_opt(&row.executed_at)?,
            payload,
            dependency_action_id: row.dependency_action_id,
            status: ScheduledStatus::parse(&row.status).ok_or_else(|| {
                StoreError::decode(format!("unknown scheduled status {:?}", row.status))
            })?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

fn rows_into<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ----------------------------------------------------------------------
// store
// ----------------------------------------------------------------------

/// SQLite implementation of [`Store`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a SQLite database and apply the schema.
    ///
    /// `database_url` is an sqlx connection string, e.g. `sqlite:tasks.db`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, single connection so every handle sees the
    /// same data. Used by tests.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// The underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, is_superuser, is_active, notification_preferences)
             VALUES (?, ?, 1, ?)
             RETURNING *",
        )
        .bind(&user.username)
        .bind(user.is_superuser as i64)
        .bind(to_json(&user.notification_preferences, "notification preferences")?)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_user_preferences(
        &self,
        id: i64,
        preferences: NotificationPreferences,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET notification_preferences = ? WHERE id = ?")
            .bind(to_json(&preferences, "notification preferences")?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("user id={}", id)));
        }
        Ok(())
    }

    async fn insert_project(&self, project: NewProject) -> StoreResult<Project> {
        let now = ts(Utc::now());
        let row = sqlx::query_as::<_, ProjectRow>(
            "INSERT INTO projects (name, slug, status, settings, created_at, updated_at)
             VALUES (?, ?, 'active', ?, ?, ?)
             RETURNING *",
        )
        .bind(&project.name)
        .bind(&project.slug)
        .bind(to_json(&project.settings, "project settings")?)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn project(&self, id: i64) -> StoreResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Project::try_from).transpose()
    }

    async fn set_project_status(&self, id: i64, status: ProjectStatus) -> StoreResult<()> {
        let now = ts(Utc::now());
        let archived_at = if status == ProjectStatus::Archived {
            Some(now.clone())
        } else {
            None
        };
        let result = sqlx::query(
            "UPDATE projects
             SET status = ?, updated_at = ?, archived_at = COALESCE(?, archived_at)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(archived_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("project id={}", id)));
        }
        Ok(())
    }

    async fn upsert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> StoreResult<ProjectMember> {
        let row = sqlx::query_as::<_, MemberRow>(
            "INSERT INTO project_members (project_id, user_id, role, is_active, joined_at)
             VALUES (?, ?, ?, 1, ?)
             ON CONFLICT (project_id, user_id) DO UPDATE SET
                 role = excluded.role,
                 is_active = 1,
                 joined_at = excluded.joined_at,
                 left_at = NULL
             RETURNING *",
        )
        .bind(member.project_id)
        .bind(member.user_id)
        .bind(to_json(&member.role, "member role")?)
        .bind(ts(now))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn member(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> StoreResult<Option<ProjectMember>> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM project_members WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProjectMember::try_from).transpose()
    }

    async fn deactivate_member(
        &self,
        project_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE project_members SET is_active = 0, left_at = ?
             WHERE project_id = ? AND user_id = ?",
        )
        .bind(ts(now))
        .bind(project_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "member project={} user={}",
                project_id, user_id
            )));
        }
        Ok(())
    }

    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            "INSERT INTO tasks (project_id, name, description, status, assignee_id,
                                creator_id, created_at, updated_at, deadline, priority,
                                position_x, position_y, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(task.project_id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.assignee_id)
        .bind(task.creator_id)
        .bind(ts(task.created_at))
        .bind(ts(task.created_at))
        .bind(ts_opt(task.deadline))
        .bind(task.priority as i64)
        .bind(task.position_x)
        .bind(task.position_y)
        .bind(&task.metadata)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn task(&self, id: i64) -> StoreResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tasks
             SET name = ?, description = ?, status = ?, assignee_id = ?,
                 updated_at = ?, started_at = ?, completed_at = ?, deadline = ?,
                 priority = ?, position_x = ?, position_y = ?, metadata = ?
             WHERE id = ?",
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.assignee_id)
        .bind(ts(task.updated_at))
        .bind(ts_opt(task.started_at))
        .bind(ts_opt(task.completed_at))
        .bind(ts_opt(task.deadline))
        .bind(task.priority as i64)
        .bind(task.position_x)
        .bind(task.position_y)
        .bind(&task.metadata)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("task id={}", task.id)));
        }
        Ok(())
    }

    async fn delete_task(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM dependency_actions WHERE dependency_id IN
                 (SELECT id FROM task_dependencies
                  WHERE source_task_id = ?1 OR target_task_id = ?1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM task_dependencies WHERE source_task_id = ?1 OR target_task_id = ?1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM task_events WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scheduled_actions WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("task id={}", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn project_tasks(
        &self,
        project_id: i64,
        filter: TaskFilter,
    ) -> StoreResult<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE project_id = ?");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.assignee_id.is_some() {
            sql.push_str(" AND assignee_id = ?");
        }
        if filter.creator_id.is_some() {
            sql.push_str(" AND creator_id = ?");
        }
        sql.push_str(
            " ORDER BY priority DESC, deadline IS NULL, deadline, created_at DESC
              LIMIT ? OFFSET ?",
        );

        let mut query = sqlx::query_as::<_, TaskRow>(&sql).bind(project_id);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(assignee_id) = filter.assignee_id {
            query = query.bind(assignee_id);
        }
        if let Some(creator_id) = filter.creator_id {
            query = query.bind(creator_id);
        }
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = query
            .bind(limit)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows_into(rows)
    }

    async fn insert_dependency(
        &self,
        dependency: NewDependency,
    ) -> StoreResult<Dependency> {
        let row = sqlx::query_as::<_, DependencyRow>(
            "INSERT INTO task_dependencies (project_id, source_task_id, target_task_id,
                                            dependency_type, description, created_by,
                                            created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(dependency.project_id)
        .bind(dependency.source_task_id)
        .bind(dependency.target_task_id)
        .bind(&dependency.dependency_type)
        .bind(&dependency.description)
        .bind(dependency.created_by)
        .bind(ts(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn dependency(&self, id: i64) -> StoreResult<Option<Dependency>> {
        let row = sqlx::query_as::<_, DependencyRow>(
            "SELECT * FROM task_dependencies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Dependency::try_from).transpose()
    }

    async fn delete_dependency(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dependency_actions WHERE dependency_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM task_dependencies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("dependency id={}", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn project_dependencies(&self, project_id: i64) -> StoreResult<Vec<Dependency>> {
        let rows = sqlx::query_as::<_, DependencyRow>(
            "SELECT * FROM task_dependencies WHERE project_id = ? ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn incoming_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>> {
        let rows = sqlx::query_as::<_, DependencyRow>(
            "SELECT * FROM task_dependencies WHERE target_task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn outgoing_dependencies(&self, task_id: i64) -> StoreResult<Vec<Dependency>> {
        let rows = sqlx::query_as::<_, DependencyRow>(
            "SELECT * FROM task_dependencies WHERE source_task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn insert_action(
        &self,
        action: NewDependencyAction,
    ) -> StoreResult<DependencyAction> {
        let row = sqlx::query_as::<_, ActionRow>(
            "INSERT INTO dependency_actions (dependency_id, kind, target_user_id,
                                             target_status, message_template,
                                             delay_minutes, execute_order, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1)
             RETURNING *",
        )
        .bind(action.dependency_id)
        .bind(action.kind.as_str())
        .bind(action.target_user_id)
        .bind(action.target_status.map(|s| s.as_str()))
        .bind(&action.message_template)
        .bind(action.delay_minutes as i64)
        .bind(action.execute_order as i64)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn action(&self, id: i64) -> StoreResult<Option<DependencyAction>> {
        let row = sqlx::query_as::<_, ActionRow>(
            "SELECT * FROM dependency_actions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DependencyAction::try_from).transpose()
    }

    async fn delete_action(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM dependency_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("action id={}", id)));
        }
        Ok(())
    }

    async fn active_actions(
        &self,
        dependency_id: i64,
    ) -> StoreResult<Vec<DependencyAction>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            "SELECT * FROM dependency_actions
             WHERE dependency_id = ? AND is_active = 1
             ORDER BY execute_order, id",
        )
        .bind(dependency_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn append_event(&self, event: NewEvent) -> StoreResult<Event> {
        let metadata = event
            .metadata
            .as_ref()
            .map(|m| to_json(m, "event metadata"))
            .transpose()?;
        let row = sqlx::query_as::<_, EventRow>(
            "INSERT INTO task_events (project_id, task_id, user_id, event_type,
                                      old_value, new_value, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(event.project_id)
        .bind(event.task_id)
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.old_value)
        .bind(&event.new_value)
        .bind(metadata)
        .bind(ts(event.created_at))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn task_events(&self, task_id: i64) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM task_events WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn insert_scheduled(
        &self,
        scheduled: NewScheduledAction,
    ) -> StoreResult<ScheduledAction> {
        let payload = scheduled
            .payload
            .as_ref()
            .map(|p| to_json(p, "scheduled payload"))
            .transpose()?;
        let row = sqlx::query_as::<_, ScheduledRow>(
            "INSERT INTO scheduled_actions (project_id, task_id, kind, scheduled_for,
                                            payload, dependency_action_id, status,
                                            created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
             RETURNING *",
        )
        .bind(scheduled.project_id)
        .bind(scheduled.task_id)
        .bind(scheduled.kind.as_str())
        .bind(ts(scheduled.scheduled_for))
        .bind(payload)
        .bind(scheduled.dependency_action_id)
        .bind(ts(scheduled.created_at))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn scheduled(&self, id: i64) -> StoreResult<Option<ScheduledAction>> {
        let row = sqlx::query_as::<_, ScheduledRow>(
            "SELECT * FROM scheduled_actions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ScheduledAction::try_from).transpose()
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ScheduledAction>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, ScheduledRow>(
            "SELECT * FROM scheduled_actions
             WHERE scheduled_for <= ? AND status = 'pending'
             ORDER BY scheduled_for, id
             LIMIT ?",
        )
        .bind(ts(now))
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query(
                "UPDATE scheduled_actions SET status = 'processing', claimed_at = ?
                 WHERE id = ?",
            )
            .bind(ts(now))
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut claimed: Vec<ScheduledAction> = rows_into(rows)?;
        for action in &mut claimed {
            action.status = ScheduledStatus::Processing;
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
        let payload = payload
            .as_ref()
            .map(|p| to_json(p, "scheduled payload"))
            .transpose()?;
        let result = sqlx::query(
            "UPDATE scheduled_actions
             SET status = ?, executed_at = ?, payload = COALESCE(?, payload)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(ts(executed_at))
        .bind(payload)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("scheduled id={}", id)));
        }
        Ok(())
    }

    async fn cancel_pending(&self, task_id: i64, kind: ScheduledKind) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM scheduled_actions
             WHERE task_id = ? AND kind = ? AND status = 'pending'",
        )
        .bind(task_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn requeue_stale(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_actions SET status = 'pending', claimed_at = NULL
             WHERE status = 'processing' AND claimed_at <= ?",
        )
        .bind(ts(older_than))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn task_scheduled(&self, task_id: i64) -> StoreResult<Vec<ScheduledAction>> {
        let rows = sqlx::query_as::<_, ScheduledRow>(
            "SELECT * FROM scheduled_actions WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }
}
