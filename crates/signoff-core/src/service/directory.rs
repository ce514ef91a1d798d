//! Identity directory: users, roles, permissions and API tokens.
//!
//! Resolves a bearer token to the [`Actor`] passed into every engine call.
//! Raw tokens are shown once at issue time; only their hash is stored.

use std::sync::Arc;

use uuid::Uuid;

use signoff_types::directory::{
    Actor, CreatePermissionRequest, CreateRoleRequest, CreateUserRequest, Permission, Role, User,
};
use signoff_types::error::EngineError;
use signoff_types::id::{PermissionId, RoleId, UserId};

use crate::clock::Clock;
use crate::repository::directory::DirectoryRepository;
use crate::service::hash::TokenHasher;

/// Prefix for issued API tokens.
pub const TOKEN_PREFIX: &str = "sgn_";

pub struct DirectoryService<R: DirectoryRepository, H: TokenHasher> {
    repo: R,
    hasher: H,
    clock: Arc<dyn Clock>,
    admin_role: String,
}

fn require_name(kind: &str, value: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{kind} cannot be empty")));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(EngineError::Validation(format!(
            "{kind} '{trimmed}' must not contain whitespace"
        )));
    }
    Ok(trimmed.to_string())
}

impl<R: DirectoryRepository, H: TokenHasher> DirectoryService<R, H> {
    pub fn new(repo: R, hasher: H, clock: Arc<dyn Clock>, admin_role: impl Into<String>) -> Self {
        Self {
            repo,
            hasher,
            clock,
            admin_role: admin_role.into(),
        }
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    // -----------------------------------------------------------------------
    // Permissions and roles
    // -----------------------------------------------------------------------

    pub async fn create_permission(
        &self,
        request: CreatePermissionRequest,
    ) -> Result<Permission, EngineError> {
        let permission = Permission {
            id: PermissionId::new(),
            name: require_name("permission name", &request.name)?,
            resource: request.resource.trim().to_string(),
            action: request.action.trim().to_string(),
            description: request.description,
            created_at: self.clock.now(),
        };
        self.repo.create_permission(&permission).await?;
        tracing::info!(permission = %permission.name, "permission created");
        Ok(permission)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, EngineError> {
        Ok(self.repo.list_permissions().await?)
    }

    async fn permission_by_name(&self, name: &str) -> Result<Permission, EngineError> {
        self.repo
            .get_permission_by_name(name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("permission '{name}'")))
    }

    pub async fn create_role(&self, request: CreateRoleRequest) -> Result<Role, EngineError> {
        let name = require_name("role name", &request.name)?;
        let mut permission_ids = Vec::with_capacity(request.permission_names.len());
        for permission_name in &request.permission_names {
            permission_ids.push(self.permission_by_name(permission_name).await?.id);
        }

        let role = Role {
            id: RoleId::new(),
            name,
            description: request.description,
            permission_ids,
            created_at: self.clock.now(),
        };
        self.repo.create_role(&role).await?;
        tracing::info!(role = %role.name, "role created");
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, EngineError> {
        Ok(self.repo.list_roles().await?)
    }

    pub async fn role_by_name(&self, name: &str) -> Result<Role, EngineError> {
        self.repo
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("role '{name}'")))
    }

    pub async fn grant_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> Result<(), EngineError> {
        let role = self.role_by_name(role_name).await?;
        let permission = self.permission_by_name(permission_name).await?;
        self.repo.grant_permission(&role.id, &permission.id).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, EngineError> {
        let username = require_name("username", &request.username)?;
        let mut role_ids = Vec::with_capacity(request.role_names.len());
        for role_name in &request.role_names {
            role_ids.push(self.role_by_name(role_name).await?.id);
        }

        let user = User {
            id: UserId::new(),
            full_name: request
                .full_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| username.clone()),
            username,
            is_active: true,
            role_ids,
            created_at: self.clock.now(),
        };
        self.repo.create_user(&user).await?;
        tracing::info!(username = %user.username, "user created");
        Ok(user)
    }

    pub async fn assign_role(&self, username: &str, role_name: &str) -> Result<(), EngineError> {
        let user = self.user_by_username(username).await?;
        let role = self.role_by_name(role_name).await?;
        self.repo.assign_role(&user.id, &role.id).await?;
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, EngineError> {
        Ok(self.repo.list_users().await?)
    }

    pub async fn count_users(&self) -> Result<u64, EngineError> {
        Ok(self.repo.count_users().await?)
    }

    pub async fn user_by_username(&self, username: &str) -> Result<User, EngineError> {
        self.repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user '{username}'")))
    }

    // -----------------------------------------------------------------------
    // Tokens and actors
    // -----------------------------------------------------------------------

    /// Issue a new API token for `username`. The raw token is returned once.
    pub async fn issue_token(&self, username: &str, label: &str) -> Result<String, EngineError> {
        let user = self.user_by_username(username).await?;
        let token = format!(
            "{TOKEN_PREFIX}{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        self.repo
            .store_token(&user.id, &self.hasher.hash_token(&token), label)
            .await?;
        tracing::info!(username = %user.username, label, "API token issued");
        Ok(token)
    }

    /// Resolve a raw bearer token to its actor.
    pub async fn authenticate(&self, token: &str) -> Result<Actor, EngineError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(EngineError::Unauthorized("missing credentials".to_string()));
        }
        let user = self
            .repo
            .find_user_by_token_hash(&self.hasher.hash_token(token))
            .await?
            .ok_or_else(|| EngineError::Unauthorized("invalid credentials".to_string()))?;
        self.actor_for(&user).await
    }

    /// Build the actor for a user, resolving permissions and admin status.
    pub async fn actor_for(&self, user: &User) -> Result<Actor, EngineError> {
        if !user.is_active {
            return Err(EngineError::Unauthorized(format!(
                "user '{}' is deactivated",
                user.username
            )));
        }
        let permission_ids = self.repo.permissions_for_roles(&user.role_ids).await?;
        let is_admin = self
            .repo
            .list_roles()
            .await?
            .iter()
            .any(|r| user.role_ids.contains(&r.id) && r.name.eq_ignore_ascii_case(&self.admin_role));

        Ok(Actor {
            user_id: user.id,
            username: user.username.clone(),
            role_ids: user.role_ids.clone(),
            permission_ids,
            is_admin,
        })
    }

    /// Actor lookup by username, used by the CLI to act as a user.
    pub async fn actor_by_username(&self, username: &str) -> Result<Actor, EngineError> {
        let user = self.user_by_username(username).await?;
        self.actor_for(&user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::testing::InMemoryStore;

    struct PlainHasher;

    impl TokenHasher for PlainHasher {
        fn hash_token(&self, token: &str) -> String {
            format!("h:{token}")
        }
    }

    fn service() -> DirectoryService<InMemoryStore, PlainHasher> {
        DirectoryService::new(InMemoryStore::default(), PlainHasher, Arc::new(SystemClock), "admin")
    }

    async fn seed(svc: &DirectoryService<InMemoryStore, PlainHasher>) {
        svc.create_permission(CreatePermissionRequest {
            name: "finance:approve".to_string(),
            resource: "finance".to_string(),
            action: "approve".to_string(),
            description: None,
        })
        .await
        .unwrap();
        svc.create_role(CreateRoleRequest {
            name: "Finance".to_string(),
            description: None,
            permission_names: vec!["finance:approve".to_string()],
        })
        .await
        .unwrap();
        svc.create_role(CreateRoleRequest {
            name: "Admin".to_string(),
            description: None,
            permission_names: vec![],
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn token_resolves_to_actor_with_permissions() {
        let svc = service();
        seed(&svc).await;
        svc.create_user(CreateUserRequest {
            username: "fran".to_string(),
            full_name: None,
            role_names: vec!["Finance".to_string()],
        })
        .await
        .unwrap();

        let token = svc.issue_token("fran", "cli").await.unwrap();
        assert!(token.starts_with(TOKEN_PREFIX));

        let actor = svc.authenticate(&token).await.unwrap();
        assert_eq!(actor.username, "fran");
        assert_eq!(actor.permission_ids.len(), 1);
        assert!(!actor.is_admin);
    }

    #[tokio::test]
    async fn admin_role_matches_case_insensitively() {
        let svc = service();
        seed(&svc).await;
        svc.create_user(CreateUserRequest {
            username: "root".to_string(),
            full_name: Some("Root User".to_string()),
            role_names: vec![],
        })
        .await
        .unwrap();
        svc.assign_role("root", "Admin").await.unwrap();

        let actor = svc.actor_by_username("root").await.unwrap();
        assert!(actor.is_admin);
    }

    #[tokio::test]
    async fn bad_tokens_are_unauthorized() {
        let svc = service();
        assert!(matches!(svc.authenticate("").await, Err(EngineError::Unauthorized(_))));
        assert!(matches!(
            svc.authenticate("sgn_nope").await,
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn unknown_role_name_is_not_found() {
        let svc = service();
        let err = svc
            .create_user(CreateUserRequest {
                username: "x".to_string(),
                full_name: None,
                role_names: vec!["Ghost".to_string()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn usernames_are_validated() {
        let svc = service();
        let err = svc
            .create_user(CreateUserRequest {
                username: "two words".to_string(),
                full_name: None,
                role_names: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
