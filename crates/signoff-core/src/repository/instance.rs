//! Request instance repository trait.

use signoff_types::audit::AuditLogEntry;
use signoff_types::error::RepositoryError;
use signoff_types::id::{InstanceId, UserId};
use signoff_types::instance::{InstanceStatus, RequestInstance, SlaBreach};

/// Filter criteria for listing instances.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
    pub requester_id: Option<UserId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Persistence for request instances and their SLA breach records.
pub trait InstanceRepository: Send + Sync {
    /// Insert a new instance with its `INSTANCE_STARTED` audit entry.
    ///
    /// Fails with `NotFound` if the definition no longer exists and with
    /// `Conflict` if it is inactive, checked atomically with the insert.
    fn insert(
        &self,
        instance: &RequestInstance,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_by_id(
        &self,
        id: &InstanceId,
    ) -> impl std::future::Future<Output = Result<Option<RequestInstance>, RepositoryError>> + Send;

    /// Instances matching the filter, newest first.
    fn list(
        &self,
        filter: &InstanceFilter,
    ) -> impl std::future::Future<Output = Result<Vec<RequestInstance>, RepositoryError>> + Send;

    /// Every non-terminal instance (`IN_PROGRESS` or `ESCALATED`).
    fn list_open(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RequestInstance>, RepositoryError>> + Send;

    /// Persist a transition and its audit entry atomically.
    ///
    /// The write only applies when the stored version equals
    /// `expected_version`; otherwise nothing is written and
    /// `RepositoryError::Conflict` is returned. `instance.version` must
    /// already carry the incremented value.
    fn save_transition(
        &self,
        instance: &RequestInstance,
        expected_version: i64,
        audit: &AuditLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record an SLA breach once per `(instance_id, step_index)`.
    ///
    /// Returns `false` without writing anything when the breach was already
    /// recorded. When `escalated` is given, the instance row is updated in
    /// the same transaction under the same version rule as
    /// [`save_transition`](Self::save_transition).
    fn record_breach(
        &self,
        breach: &SlaBreach,
        audit: &AuditLogEntry,
        escalated: Option<(&RequestInstance, i64)>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Instance counts per status.
    fn count_by_status(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<(InstanceStatus, u64)>, RepositoryError>> + Send;

    fn count_breaches(&self)
    -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
