//! Audit log repository trait.

use signoff_types::audit::AuditLogEntry;
use signoff_types::error::RepositoryError;
use signoff_types::id::InstanceId;

/// Append-only store of audit entries. There is no update or delete.
pub trait AuditRepository: Send + Sync {
    fn append(
        &self,
        entry: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Entries for one instance in the order they were written.
    fn list_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> impl std::future::Future<Output = Result<Vec<AuditLogEntry>, RepositoryError>> + Send;

    /// Most recent entries across all resources, newest first.
    fn list_recent(
        &self,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<AuditLogEntry>, RepositoryError>> + Send;
}
