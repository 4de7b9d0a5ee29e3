//! Project roles: named capability bundles

use serde::{Deserialize, Serialize};

/// Capability bundle granted to a project member.
///
/// The canonical instances (`owner`, `manager`, `developer`, `observer`)
/// cover the usual spread; a deployment may define others, the predicates in
/// [`crate::authz`] only ever read the flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRole {
    pub name: String,
    pub priority: i32,

    // task capabilities
    pub can_create_tasks: bool,
    pub can_edit_any_task: bool,
    pub can_delete_any_task: bool,
    pub can_edit_own_task: bool,
    pub can_delete_own_task: bool,

    // dependency capabilities
    pub can_create_dependencies: bool,
    pub can_delete_dependencies: bool,

    // project capabilities
    pub can_manage_members: bool,
    pub can_edit_project: bool,
    pub can_delete_project: bool,
}

impl ProjectRole {
    /// Everything allowed
    pub fn owner() -> Self {
        Self {
            name: "owner".to_string(),
            priority: 100,
            can_create_tasks: true,
            can_edit_any_task: true,
            can_delete_any_task: true,
            can_edit_own_task: true,
            can_delete_own_task: true,
            can_create_dependencies: true,
            can_delete_dependencies: true,
            can_manage_members: true,
            can_edit_project: true,
            can_delete_project: true,
        }
    }

    /// Everything except deleting the project
    pub fn manager() -> Self {
        Self {
            name: "manager".to_string(),
            priority: 80,
            can_delete_project: false,
            ..Self::owner()
        }
    }

    /// Own-task editing plus edge creation
    pub fn developer() -> Self {
        Self {
            name: "developer".to_string(),
            priority: 60,
            can_create_tasks: true,
            can_edit_any_task: false,
            can_delete_any_task: false,
            can_edit_own_task: true,
            can_delete_own_task: true,
            can_create_dependencies: true,
            can_delete_dependencies: false,
            can_manage_members: false,
            can_edit_project: false,
            can_delete_project: false,
        }
    }

    /// Read-only
    pub fn observer() -> Self {
        Self {
            name: "observer".to_string(),
            priority: 40,
            can_create_tasks: false,
            can_edit_any_task: false,
            can_delete_any_task: false,
            can_edit_own_task: false,
            can_delete_own_task: false,
            can_create_dependencies: false,
            can_delete_dependencies: false,
            can_manage_members: false,
            can_edit_project: false,
            can_delete_project: false,
        }
    }

    /// Canonical role by name
    pub fn by_name(name: &str) -> Option<ProjectRole> {
        match name {
            "owner" => Some(Self::owner()),
            "manager" => Some(Self::manager()),
            "developer" => Some(Self::developer()),
            "observer" => Some(Self::observer()),
            _ => None,
        }
    }
}
