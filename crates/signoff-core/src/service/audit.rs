//! Audit recorder: the read side of the audit log plus standalone appends.
//!
//! Entries that belong to an engine transition are written by the
//! repositories inside that transition; everything else goes through
//! [`AuditRecorder::record`].

use signoff_types::audit::AuditLogEntry;
use signoff_types::error::EngineError;
use signoff_types::id::InstanceId;

use crate::repository::audit::AuditRepository;

/// Upper bound for `list_recent`.
pub const MAX_RECENT: i64 = 500;

pub struct AuditRecorder<A: AuditRepository> {
    repo: A,
}

impl<A: AuditRepository> AuditRecorder<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }

    pub async fn record(&self, entry: &AuditLogEntry) -> Result<(), EngineError> {
        self.repo.append(entry).await?;
        tracing::debug!(action = %entry.action, resource = %entry.resource_id, "audit recorded");
        Ok(())
    }

    pub async fn list_by_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<AuditLogEntry>, EngineError> {
        Ok(self.repo.list_for_instance(instance_id).await?)
    }

    /// Newest entries first, `limit` clamped to `1..=MAX_RECENT`.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, EngineError> {
        Ok(self.repo.list_recent(limit.clamp(1, MAX_RECENT)).await?)
    }
}
