use thiserror::Error;

use crate::id::DefinitionId;

/// Errors from repository operations (used by trait definitions in signoff-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the workflow engine and its services.
///
/// Callers distinguish "refresh and retry" (`Conflict`, `InactiveDefinition`)
/// from "re-authenticate" (`Unauthorized`, `Forbidden`) via [`EngineError::kind`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed definition or input. Never retried automatically.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The actor does not satisfy the current step's gate.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Stale version, no actionable step, undefined transition or a
    /// referenced definition.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("workflow definition {0} is inactive")]
    InactiveDefinition(DefinitionId),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Coarse error classes used for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Unauthorized,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::Conflict(_) | EngineError::InactiveDefinition(_) => ErrorKind::Conflict,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for the lost-race conflict returned by the executor.
    pub fn stale() -> Self {
        EngineError::Conflict("stale instance state".to_string())
    }
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => EngineError::NotFound("entity".to_string()),
            RepositoryError::Conflict(msg) => EngineError::Conflict(msg),
            other => EngineError::Storage(other.to_string()),
        }
    }
}
