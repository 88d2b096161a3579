use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::{TokenError, TokenService};
use crate::error::AccountError;

/// Extracts and validates the bearer token, yielding the user id.
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AccountError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = TokenService::from_ref(state);

        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AccountError::Unauthorized(TokenError::Malformed))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AccountError::Unauthorized(TokenError::Malformed))?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(reason = %e, "rejected bearer token");
            AccountError::Unauthorized(e)
        })?;

        Ok(AuthUser(claims.user_id))
    }
}
