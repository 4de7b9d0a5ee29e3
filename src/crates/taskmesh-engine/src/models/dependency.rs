//! Dependencies: directed edges of the project graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default dependency type for plain ordering edges
pub const SIMPLE_DEPENDENCY: &str = "simple";

/// A directed `source -> target` edge within one project.
///
/// The source must complete before the target counts as ready. Edges are
/// unique per `(source, target)` pair and the per-project edge set stays
/// acyclic at every observable instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: i64,
    pub project_id: i64,
    pub source_task_id: i64,
    pub target_task_id: i64,
    pub dependency_type: String,
    pub description: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a dependency
#[derive(Debug, Clone)]
pub struct NewDependency {
    pub project_id: i64,
    pub source_task_id: i64,
    pub target_task_id: i64,
    pub dependency_type: String,
    pub description: Option<String>,
    pub created_by: i64,
}

impl NewDependency {
    pub fn simple(
        project_id: i64,
        source_task_id: i64,
        target_task_id: i64,
        created_by: i64,
    ) -> Self {
        Self {
            project_id,
            source_task_id,
            target_task_id,
            dependency_type: SIMPLE_DEPENDENCY.to_string(),
            description: None,
            created_by,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
