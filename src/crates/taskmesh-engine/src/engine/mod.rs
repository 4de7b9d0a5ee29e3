//! The task engine
//!
//! [`TaskEngine`] orchestrates task creation, mutation, status transitions,
//! dependency management, and the completion cascade. Every state-changing
//! operation starts with an AuthZ check, runs its graph-invariant checks
//! under the owning project's lock, writes through the injected store, and
//! appends exactly one event per observable change.

pub mod dependencies;
pub mod tasks;

pub use dependencies::CreateDependency;
pub use tasks::{
    CreateTask, GraphEdge, GraphNode, GraphSnapshot, StatusChange, TaskStats, TaskUpdate,
};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{Dependency, Project, ProjectRole, Task, User};
use crate::notifier::{NotificationKind, Notifier, NotifyError};
use crate::store::{Store, StoreResult};
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Username shown when a weak user reference no longer resolves
pub const UNKNOWN_USER: &str = "unknown";

/// Command entry point over the task/dependency graph.
pub struct TaskEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    // per-project serialization of mutations; the cycle check and the edge
    // insert must be atomic with respect to other inserts on the project
    project_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskEngine {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(store, notifier, clock, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn project_lock(&self, project_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.project_locks.lock().expect("project lock map poisoned");
        locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // loads
    // ------------------------------------------------------------------

    pub(crate) async fn load_user(&self, id: i64) -> Result<User> {
        self.store
            .user(id)
            .await?
            .ok_or(EngineError::not_found("user", id))
    }

    pub(crate) async fn load_project(&self, id: i64) -> Result<Project> {
        self.store
            .project(id)
            .await?
            .ok_or(EngineError::not_found("project", id))
    }

    pub(crate) async fn load_task(&self, id: i64) -> Result<Task> {
        self.store
            .task(id)
            .await?
            .ok_or(EngineError::not_found("task", id))
    }

    pub(crate) async fn load_dependency(&self, id: i64) -> Result<Dependency> {
        self.store
            .dependency(id)
            .await?
            .ok_or(EngineError::not_found("dependency", id))
    }

    /// The actor's role in a project, if the membership is active
    pub(crate) async fn active_role(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Option<ProjectRole>> {
        let member = self.store.member(project_id, user_id).await?;
        Ok(member.filter(|m| m.is_active).map(|m| m.role))
    }

    /// Resolve a weak user reference to a username
    pub(crate) async fn username_or_unknown(&self, user_id: Option<i64>) -> String {
        match user_id {
            Some(id) => match self.store.user(id).await {
                Ok(Some(user)) => user.username,
                _ => UNKNOWN_USER.to_string(),
            },
            None => UNKNOWN_USER.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // shared plumbing
    // ------------------------------------------------------------------

    /// Run a store write, retrying contention with bounded backoff.
    pub(crate) async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(err) if err.is_busy() && attempt + 1 < self.config.store_retry_attempts => {
                    attempt += 1;
                    warn!(attempt, error = %err, "store busy, backing off");
                    tokio::time::sleep(self.config.store_retry_backoff * attempt).await;
                }
                result => return result.map_err(EngineError::from),
            }
        }
    }

    /// Dispatch through the notifier under the configured timeout.
    ///
    /// A timeout is a failure of this dispatch only; callers record it and
    /// continue.
    pub(crate) async fn dispatch(
        &self,
        recipient_id: i64,
        kind: NotificationKind,
        payload: HashMap<String, String>,
    ) -> std::result::Result<(), NotifyError> {
        match tokio::time::timeout(
            self.config.notify_timeout,
            self.notifier.notify(recipient_id, kind, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.config.notify_timeout)),
        }
    }
}
