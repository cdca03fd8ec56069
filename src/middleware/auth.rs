use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity. Authentication happens upstream at the gateway; this
/// service trusts the forwarded `X-User-Id` header and only checks that it
/// is present and a well-formed UUID.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".to_string()))?;

        let user_id = Uuid::parse_str(header)
            .map_err(|_| AppError::Unauthorized("X-User-Id is not a valid UUID".to_string()))?;

        Ok(AuthUser { user_id })
    }
}
