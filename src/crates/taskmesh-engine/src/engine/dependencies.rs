//! Dependency operations
//!
//! Edge creation and removal plus the action rules attached to edges. The
//! cycle-prevention check and the insert run under the project lock so
//! concurrent inserts cannot sneak a cycle past each other.

use crate::actions::TRIGGER_TASK_COMPLETED;
use crate::authz;
use crate::engine::TaskEngine;
use crate::error::EngineError;
use crate::graph::TaskGraph;
use crate::models::dependency::SIMPLE_DEPENDENCY;
use crate::models::{
    ActionKind, Dependency, DependencyAction, EventType, NewDependency, NewDependencyAction,
    NewEvent,
};
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Request payload for [`TaskEngine::create_dependency`]
#[derive(Debug, Clone)]
pub struct CreateDependency {
    pub source_task_id: i64,
    pub target_task_id: i64,
    pub dependency_type: String,
    pub description: Option<String>,
}

impl CreateDependency {
    pub fn new(source_task_id: i64, target_task_id: i64) -> Self {
        Self {
            source_task_id,
            target_task_id,
            dependency_type: SIMPLE_DEPENDENCY.to_string(),
            description: None,
        }
    }

    pub fn with_type(mut self, dependency_type: impl Into<String>) -> Self {
        self.dependency_type = dependency_type.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TaskEngine {
    /// Insert an edge `source -> target`.
    ///
    /// Requires `can_create_dependencies` on the source task. Validates the
    /// edge invariants through [`TaskGraph`]; when the source is already
    /// final, the new edge's actions run immediately.
    pub async fn create_dependency(
        &self,
        actor_id: i64,
        req: CreateDependency,
    ) -> Result<Dependency> {
        let actor = self.load_user(actor_id).await?;
        let source = self.load_task(req.source_task_id).await?;
        let target = self.load_task(req.target_task_id).await?;
        if source.project_id != target.project_id {
            return Err(EngineError::validation(
                "source and target must belong to the same project",
            ));
        }
        let role = self.active_role(actor_id, source.project_id).await?;
        if !authz::can_create_dependencies(&actor, role.as_ref(), &source) {
            return Err(EngineError::forbidden(
                "no permission to create dependencies for this task",
            ));
        }

        let lock = self.project_lock(source.project_id);
        let _guard = lock.lock().await;

        let graph = TaskGraph::load(self.store.as_ref(), source.project_id).await?;
        graph.check_insert(&source, &target)?;

        let dependency = {
            let store = Arc::clone(&self.store);
            let payload = NewDependency {
                project_id: source.project_id,
                source_task_id: source.id,
                target_task_id: target.id,
                dependency_type: req.dependency_type.clone(),
                description: req.description.clone(),
                created_by: actor.id,
            };
            self.retry(move || {
                let store = Arc::clone(&store);
                let payload = payload.clone();
                async move { store.insert_dependency(payload).await }
            })
            .await?
        };

        self.store
            .append_event(
                NewEvent::new(
                    source.project_id,
                    source.id,
                    actor.id,
                    EventType::DependencyAdded,
                    self.clock.now(),
                )
                .with_metadata(json!({
                    "dependency_id": dependency.id,
                    "target_task_id": target.id,
                    "target_task_name": target.name,
                })),
            )
            .await?;

        info!(
            dependency_id = dependency.id,
            source = source.id,
            target = target.id,
            "dependency created"
        );

        // a finished source fires the new edge right away
        if source.status.is_final() {
            let (outcomes, newly_final) = self
                .evaluate_dependency(&dependency, TRIGGER_TASK_COMPLETED, &actor)
                .await;
            debug!(
                dependency_id = dependency.id,
                actions = outcomes.len(),
                "evaluated edge with already-final source"
            );
            for task_id in newly_final {
                self.run_completion_cascade(task_id, &actor).await;
            }
        }

        Ok(dependency)
    }

    /// Remove an edge. Requires `can_delete_dependencies` in the edge's
    /// project; writes a `dependency_removed` event on the source task.
    pub async fn delete_dependency(&self, dependency_id: i64, actor_id: i64) -> Result<()> {
        let actor = self.load_user(actor_id).await?;
        let dependency = self.load_dependency(dependency_id).await?;
        let role = self.active_role(actor_id, dependency.project_id).await?;
        if !authz::can_delete_dependencies(&actor, role.as_ref()) {
            return Err(EngineError::forbidden(
                "no permission to delete dependencies",
            ));
        }

        let lock = self.project_lock(dependency.project_id);
        let _guard = lock.lock().await;

        let target_name = match self.store.task(dependency.target_task_id).await? {
            Some(task) => task.name,
            None => "unknown".to_string(),
        };
        self.store
            .append_event(
                NewEvent::new(
                    dependency.project_id,
                    dependency.source_task_id,
                    actor.id,
                    EventType::DependencyRemoved,
                    self.clock.now(),
                )
                .with_metadata(json!({
                    "target_task_id": dependency.target_task_id,
                    "target_task_name": target_name,
                })),
            )
            .await?;

        self.store.delete_dependency(dependency_id).await?;
        info!(dependency_id, "dependency deleted");
        Ok(())
    }

    /// Attach an action rule to an edge. Requires `edit_any_task`.
    ///
    /// Validates the kind's declared requirements: an explicit recipient for
    /// kinds that need one, a template for notification kinds (the
    /// assignee notification falls back to its default), and a target status
    /// for `change_status`.
    pub async fn add_dependency_action(
        &self,
        actor_id: i64,
        mut req: NewDependencyAction,
    ) -> Result<DependencyAction> {
        let actor = self.load_user(actor_id).await?;
        let dependency = self.load_dependency(req.dependency_id).await?;
        let role = self.active_role(actor_id, dependency.project_id).await?;
        if !authz::can_manage_dependency_actions(&actor, role.as_ref()) {
            return Err(EngineError::forbidden(
                "no permission to manage dependency actions",
            ));
        }

        if req.kind.requires_target_user() && req.target_user_id.is_none() {
            return Err(EngineError::validation(format!(
                "action kind {} requires a target user",
                req.kind
            )));
        }
        if req.kind.requires_template() && req.message_template.is_none() {
            if req.kind == ActionKind::NotifyAssignee {
                req.message_template =
                    Some(crate::actions::DEFAULT_READY_TEMPLATE.to_string());
            } else {
                return Err(EngineError::validation(format!(
                    "action kind {} requires a message template",
                    req.kind
                )));
            }
        }
        if req.kind == ActionKind::ChangeStatus && req.target_status.is_none() {
            return Err(EngineError::validation(
                "change_status requires a target status",
            ));
        }

        let action = self.store.insert_action(req).await?;
        info!(
            action_id = action.id,
            dependency_id = dependency.id,
            kind = %action.kind,
            "dependency action added"
        );
        Ok(action)
    }

    /// Detach an action rule. Requires `edit_any_task`.
    pub async fn remove_dependency_action(
        &self,
        action_id: i64,
        actor_id: i64,
    ) -> Result<()> {
        let actor = self.load_user(actor_id).await?;
        let action = self
            .store
            .action(action_id)
            .await?
            .ok_or(EngineError::not_found("dependency action", action_id))?;
        let dependency = self.load_dependency(action.dependency_id).await?;
        let role = self.active_role(actor_id, dependency.project_id).await?;
        if !authz::can_manage_dependency_actions(&actor, role.as_ref()) {
            return Err(EngineError::forbidden(
                "no permission to manage dependency actions",
            ));
        }

        self.store.delete_action(action_id).await?;
        info!(action_id, "dependency action removed");
        Ok(())
    }
}
