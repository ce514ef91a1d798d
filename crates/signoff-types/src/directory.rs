//! Users, roles, permissions and the resolved acting identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{PermissionId, RoleId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
}

/// Granular capability, e.g. `finance:approve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The authenticated identity on whose behalf an engine call runs.
///
/// Resolved once per request at the transport boundary and passed
/// explicitly into every engine and task query call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub role_ids: Vec<RoleId>,
    /// Union of the permissions granted by all of the actor's roles.
    pub permission_ids: Vec<PermissionId>,
    /// Holds the configured admin role; bypasses step gates.
    pub is_admin: bool,
}

impl Actor {
    pub fn has_role(&self, role: &RoleId) -> bool {
        self.role_ids.contains(role)
    }

    pub fn has_permission(&self, permission: &PermissionId) -> bool {
        self.permission_ids.contains(permission)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub role_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}
