//! Users, roles, permissions and API tokens.

use signoff_types::directory::{Permission, Role, User};
use signoff_types::error::RepositoryError;
use signoff_types::id::{PermissionId, RoleId, UserId};

/// Persistence for the identity directory.
///
/// Name and username uniqueness is enforced by the implementation and
/// reported as `RepositoryError::Conflict`.
pub trait DirectoryRepository: Send + Sync {
    fn create_permission(
        &self,
        permission: &Permission,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_permissions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Permission>, RepositoryError>> + Send;

    fn get_permission_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Permission>, RepositoryError>> + Send;

    fn create_role(
        &self,
        role: &Role,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_roles(&self)
    -> impl std::future::Future<Output = Result<Vec<Role>, RepositoryError>> + Send;

    fn get_role_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Role>, RepositoryError>> + Send;

    /// Idempotent: granting an already granted permission is a no-op.
    fn grant_permission(
        &self,
        role_id: &RoleId,
        permission_id: &PermissionId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_user(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list_users(&self)
    -> impl std::future::Future<Output = Result<Vec<User>, RepositoryError>> + Send;

    fn get_user(
        &self,
        id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Idempotent, like `grant_permission`.
    fn assign_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Union of the permissions granted to the given roles.
    fn permissions_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> impl std::future::Future<Output = Result<Vec<PermissionId>, RepositoryError>> + Send;

    /// Store the hash of an issued API token.
    fn store_token(
        &self,
        user_id: &UserId,
        token_hash: &str,
        label: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Active user owning a token with the given hash.
    fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    fn count_users(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
