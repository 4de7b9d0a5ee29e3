//! Typed task graph for one project
//!
//! [`TaskGraph`] projects a project's dependency rows into adjacency lists,
//! enforces the edge invariants (same project, no self-loop, no duplicate,
//! acyclicity), and answers the readiness predicate. Reachability runs on an
//! explicit stack so arbitrarily deep graphs cannot overflow the native
//! stack.

use crate::error::EngineError;
use crate::models::{Dependency, Task, TaskStatus};
use crate::store::Store;
use crate::Result;
use std::collections::{HashMap, HashSet};
use taskmesh_graph::Adjacency;

/// In-memory projection of one project's edges.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    project_id: i64,
    edges: Vec<Dependency>,
    outgoing: HashMap<i64, Vec<usize>>,
    incoming: HashMap<i64, Vec<usize>>,
}

impl TaskGraph {
    /// Build from already-loaded dependency rows
    pub fn from_edges(project_id: i64, edges: Vec<Dependency>) -> Self {
        let mut outgoing: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source_task_id).or_default().push(idx);
            incoming.entry(edge.target_task_id).or_default().push(idx);
        }
        Self {
            project_id,
            edges,
            outgoing,
            incoming,
        }
    }

    /// Load the current edge set of a project from the store
    pub async fn load(store: &dyn Store, project_id: i64) -> Result<Self> {
        let edges = store.project_dependencies(project_id).await?;
        Ok(Self::from_edges(project_id, edges))
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges pointing at `task_id`
    pub fn incoming(&self, task_id: i64) -> Vec<&Dependency> {
        self.incoming
            .get(&task_id)
            .map(|idxs| idxs.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Edges leaving `task_id`
    pub fn outgoing(&self, task_id: i64) -> Vec<&Dependency> {
        self.outgoing
            .get(&task_id)
            .map(|idxs| idxs.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Both directions at once
    pub fn dependencies_of(&self, task_id: i64) -> (Vec<&Dependency>, Vec<&Dependency>) {
        (self.incoming(task_id), self.outgoing(task_id))
    }

    /// Iterative reachability `from ⇒* to` over current edges
    pub fn reachable(&self, from: i64, to: i64) -> bool {
        if from == to {
            return true;
        }
        let mut visited: HashSet<i64> = HashSet::new();
        let mut stack = vec![from];
        while let Some(v) = stack.pop() {
            if !visited.insert(v) {
                continue;
            }
            if let Some(idxs) = self.outgoing.get(&v) {
                for &idx in idxs {
                    let next = self.edges[idx].target_task_id;
                    if next == to {
                        return true;
                    }
                    if !visited.contains(&next) {
                        stack.push(next);
                    }
                }
            }
        }
        false
    }

    /// Validate inserting `source -> target` against the edge invariants.
    ///
    /// Checks, in order: both endpoints in this project, no self-loop, no
    /// duplicate pair, and that the edge would not close a cycle (i.e.
    /// `target` must not already reach `source`).
    pub fn check_insert(&self, source: &Task, target: &Task) -> Result<()> {
        if source.project_id != self.project_id || target.project_id != self.project_id {
            return Err(EngineError::validation(
                "tasks must belong to the same project as the graph",
            ));
        }
        if source.id == target.id {
            return Err(EngineError::WouldCreateCycle);
        }
        let duplicate = self
            .outgoing
            .get(&source.id)
            .is_some_and(|idxs| idxs.iter().any(|&i| self.edges[i].target_task_id == target.id));
        if duplicate {
            return Err(EngineError::DuplicateDependency {
                from_id: source.id,
                target: target.id,
            });
        }
        if self.reachable(target.id, source.id) {
            return Err(EngineError::WouldCreateCycle);
        }
        Ok(())
    }

    /// Readiness: a `todo` task with every upstream source `completed`.
    ///
    /// `status_of` resolves source-task statuses; an unresolvable source
    /// counts as not completed.
    pub fn is_ready<F>(&self, task: &Task, status_of: F) -> bool
    where
        F: Fn(i64) -> Option<TaskStatus>,
    {
        if task.status != TaskStatus::Todo {
            return false;
        }
        let Some(idxs) = self.incoming.get(&task.id) else {
            return true;
        };
        idxs.iter().all(|&i| {
            status_of(self.edges[i].source_task_id) == Some(TaskStatus::Completed)
        })
    }

    /// Bridge into the algorithm suite: one vertex per task id, weight 0.
    ///
    /// `extra_vertices` registers tasks without edges so orderings cover the
    /// whole project. The algorithms address vertices as `i128`; task ids
    /// embed losslessly.
    pub fn to_adjacency(&self, extra_vertices: impl IntoIterator<Item = i64>) -> Adjacency {
        let mut adj = Adjacency::new();
        for v in extra_vertices {
            adj.add_vertex(v as i128);
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            adj.add_edge(
                edge.source_task_id as i128,
                edge.target_task_id as i128,
                idx,
                0,
            );
        }
        adj
    }
}
