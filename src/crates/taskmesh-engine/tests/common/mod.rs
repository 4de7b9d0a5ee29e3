//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use taskmesh_engine::models::{
    Dependency, NewMember, NewProject, NewUser, NotificationPreferences, Project,
    ProjectRole, Task, User,
};
use taskmesh_engine::{
    Clock, CreateDependency, CreateTask, ManualClock, MemoryNotifier, MemoryStore, Notifier,
    Store, TaskEngine,
};

/// Deterministic start-of-test instant
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<TaskEngine>,
    pub project: Project,
    pub owner: User,
}

/// Engine over memory store/notifier and a manual clock, with one active
/// project owned by `olga`.
pub async fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let clock = Arc::new(ManualClock::new(t0()));

    let engine = Arc::new(TaskEngine::new(
        store.clone() as Arc<dyn Store>,
        notifier.clone() as Arc<dyn Notifier>,
        clock.clone() as Arc<dyn Clock>,
    ));

    let owner = store.insert_user(NewUser::new("olga")).await.unwrap();
    let project = store
        .insert_project(NewProject::new("Apollo", "apollo"))
        .await
        .unwrap();
    store
        .upsert_member(NewMember::new(project.id, owner.id, ProjectRole::owner()), t0())
        .await
        .unwrap();

    Fixture {
        store,
        notifier,
        clock,
        engine,
        project,
        owner,
    }
}

impl Fixture {
    /// Add a user as an active member of the fixture project
    pub async fn member(&self, username: &str, role: ProjectRole) -> User {
        self.member_with_prefs(username, role, NotificationPreferences::default())
            .await
    }

    pub async fn member_with_prefs(
        &self,
        username: &str,
        role: ProjectRole,
        preferences: NotificationPreferences,
    ) -> User {
        let user = self
            .store
            .insert_user(NewUser::new(username).with_preferences(preferences))
            .await
            .unwrap();
        self.store
            .upsert_member(NewMember::new(self.project.id, user.id, role), t0())
            .await
            .unwrap();
        user
    }

    /// A user with no membership anywhere
    pub async fn outsider(&self, username: &str) -> User {
        self.store.insert_user(NewUser::new(username)).await.unwrap()
    }

    /// Create a plain todo task as the owner
    pub async fn task(&self, name: &str) -> Task {
        self.engine
            .create_task(self.owner.id, CreateTask::new(self.project.id, name))
            .await
            .unwrap()
    }

    /// Create a simple edge as the owner
    pub async fn edge(&self, source: &Task, target: &Task) -> Dependency {
        self.engine
            .create_dependency(self.owner.id, CreateDependency::new(source.id, target.id))
            .await
            .unwrap()
    }
}
