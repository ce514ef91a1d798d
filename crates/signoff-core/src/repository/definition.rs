//! Workflow definition repository trait.

use signoff_types::audit::AuditLogEntry;
use signoff_types::definition::WorkflowDefinition;
use signoff_types::error::RepositoryError;
use signoff_types::id::DefinitionId;

/// Persistence for workflow definitions.
///
/// Implementations live in signoff-infra (e.g., SqliteDefinitionRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait DefinitionRepository: Send + Sync {
    /// Insert a definition together with its creation audit entry.
    ///
    /// Returns `RepositoryError::Conflict` when the name is already taken.
    fn create(
        &self,
        definition: &WorkflowDefinition,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_by_id(
        &self,
        id: &DefinitionId,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// All definitions, newest first.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Flip the active flag and append the audit entry atomically.
    fn set_active(
        &self,
        id: &DefinitionId,
        is_active: bool,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a definition that no open instance references.
    ///
    /// `NotFound` when missing, `Conflict` when an open instance still
    /// references it. The check and the delete run in one transaction.
    fn delete_unreferenced(
        &self,
        id: &DefinitionId,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
