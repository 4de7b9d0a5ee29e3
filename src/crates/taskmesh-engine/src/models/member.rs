//! Project membership

use crate::models::role::ProjectRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's membership in a project, unique on `(project, user)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub role: ProjectRole,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Insert/upsert payload for a membership.
///
/// Upserting an existing `(project, user)` pair reactivates the membership
/// with the new role; apart from audit timestamps the result is equivalent to
/// a membership that was never removed.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub project_id: i64,
    pub user_id: i64,
    pub role: ProjectRole,
}

impl NewMember {
    pub fn new(project_id: i64, user_id: i64, role: ProjectRole) -> Self {
        Self {
            project_id,
            user_id,
            role,
        }
    }
}
