//! Bearer token authentication extractor.
//!
//! Reads the token from `Authorization: Bearer <token>` (or `X-API-Key`)
//! and resolves it to an [`Actor`] through the directory service, which
//! compares SHA-256 hashes against stored tokens.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use signoff_types::directory::Actor;
use signoff_types::error::EngineError;

use crate::http::error::AppError;
use crate::state::AppState;

/// The authenticated actor for the current request.
pub struct CurrentActor(pub Actor);

impl CurrentActor {
    /// Reject the request unless the actor holds the admin role.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.0.is_admin {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "'{}' is not an administrator",
                self.0.username
            ))
            .into())
        }
    }
}

impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let actor = state.directory.authenticate(&token).await?;
        tracing::debug!(actor = %actor.username, "authenticated");
        Ok(CurrentActor(actor))
    }
}

fn unauthorized(msg: &str) -> AppError {
    EngineError::Unauthorized(msg.to_string()).into()
}

fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth
            .to_str()
            .map_err(|_| unauthorized("invalid Authorization header encoding"))?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Some(key) = parts.headers.get("x-api-key") {
        let key_str = key
            .to_str()
            .map_err(|_| unauthorized("invalid X-API-Key header encoding"))?;
        return Ok(key_str.trim().to_string());
    }

    Err(unauthorized(
        "missing token; provide 'Authorization: Bearer <token>'",
    ))
}
