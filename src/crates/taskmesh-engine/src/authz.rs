//! Authorization predicates
//!
//! Pure, side-effect-free checks over already-loaded data. The engine
//! resolves the actor's active role in the task's project through the store,
//! then consults these functions; nothing here performs I/O.
//!
//! Superuser status is an explicit predicate that short-circuits every
//! capability, not a bypass scattered through callers.

use crate::models::{ProjectRole, Task, User};

/// Explicit superuser predicate
pub fn is_superuser(user: &User) -> bool {
    user.is_superuser
}

/// Membership is an active role in the project
pub fn is_member(role: Option<&ProjectRole>) -> bool {
    role.is_some()
}

pub fn can_manage_members(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_manage_members)
}

pub fn can_edit_project(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_edit_project)
}

pub fn can_delete_project(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_delete_project)
}

pub fn can_create_tasks(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_create_tasks)
}

/// Edit a specific task: `edit_any_task`, or `edit_own_task` when the actor
/// created the task or is assigned to it.
pub fn can_edit_task(user: &User, role: Option<&ProjectRole>, task: &Task) -> bool {
    if is_superuser(user) {
        return true;
    }
    let Some(role) = role else {
        return false;
    };
    if role.can_edit_any_task {
        return true;
    }
    if role.can_edit_own_task {
        return task.creator_id == user.id || task.assignee_id == Some(user.id);
    }
    false
}

/// Delete a specific task: `delete_any_task`, or `delete_own_task` when the
/// actor created the task.
pub fn can_delete_task(user: &User, role: Option<&ProjectRole>, task: &Task) -> bool {
    if is_superuser(user) {
        return true;
    }
    let Some(role) = role else {
        return false;
    };
    if role.can_delete_any_task {
        return true;
    }
    if role.can_delete_own_task {
        return task.creator_id == user.id;
    }
    false
}

/// Create an edge out of `source`: requires the `create_dependencies` flag;
/// without `edit_any_task` the actor must additionally be the source task's
/// creator or assignee.
pub fn can_create_dependencies(
    user: &User,
    role: Option<&ProjectRole>,
    source: &Task,
) -> bool {
    if is_superuser(user) {
        return true;
    }
    let Some(role) = role else {
        return false;
    };
    if !role.can_create_dependencies {
        return false;
    }
    if role.can_edit_any_task {
        return true;
    }
    source.creator_id == user.id || source.assignee_id == Some(user.id)
}

pub fn can_delete_dependencies(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_delete_dependencies)
}

/// Attaching and removing dependency actions is manager-level work
pub fn can_manage_dependency_actions(user: &User, role: Option<&ProjectRole>) -> bool {
    is_superuser(user) || role.is_some_and(|r| r.can_edit_any_task)
}
