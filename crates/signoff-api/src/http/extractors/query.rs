//! Query parameter extractors and path id parsing.

use std::str::FromStr;

use serde::Deserialize;

use signoff_core::repository::instance::InstanceFilter;
use signoff_types::id::UserId;
use signoff_types::instance::InstanceStatus;

use crate::http::error::AppError;

/// Query parameters for `GET /requests`.
#[derive(Debug, Deserialize, Default)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub requester_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RequestListQuery {
    pub fn into_filter(self) -> Result<InstanceFilter, AppError> {
        let status = match &self.status {
            Some(s) => Some(s.parse::<InstanceStatus>().map_err(AppError::Validation)?),
            None => None,
        };
        let requester_id = match &self.requester_id {
            Some(s) => Some(parse_id::<UserId>("requester_id", s)?),
            None => None,
        };
        Ok(InstanceFilter {
            status,
            requester_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Query parameters for `GET /audit`.
#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub request_id: Option<String>,
    pub limit: Option<i64>,
}

/// Parse an id from a path segment or query value.
pub fn parse_id<T: FromStr>(kind: &str, value: &str) -> Result<T, AppError> {
    value
        .parse::<T>()
        .map_err(|_| AppError::Validation(format!("invalid {kind}: '{value}'")))
}
