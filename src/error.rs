use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{accounts::repo::RepoError, auth::jwt::TokenError};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("user with such email already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid user password")]
    InvalidPassword,
    #[error("authenticated user is not allowed to access this user")]
    Forbidden,
    #[error("invalid data format: {0}")]
    Unprocessable(String),
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] TokenError),
    /// The user was persisted but the confirmation event never reached the broker.
    #[error("confirmation dispatch failed: {0:#}")]
    Dispatch(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RepoError> for AccountError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => AccountError::UserNotFound,
            RepoError::Conflict => AccountError::UserExists,
            RepoError::Backend(e) => AccountError::Internal(e),
        }
    }
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::UserExists | AccountError::InvalidPassword => StatusCode::CONFLICT,
            AccountError::UserNotFound => StatusCode::NOT_FOUND,
            AccountError::Forbidden => StatusCode::FORBIDDEN,
            AccountError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AccountError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AccountError::Dispatch(_) | AccountError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AccountError::UserExists => "user_exists",
            AccountError::UserNotFound => "not_found",
            AccountError::InvalidPassword => "invalid_password",
            AccountError::Forbidden => "forbidden",
            AccountError::Unprocessable(_) => "unprocessable",
            AccountError::Unauthorized(_) => "unauthorized",
            AccountError::Dispatch(_) | AccountError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        // never leak internal detail to the client
        let message = match &self {
            AccountError::Dispatch(e) | AccountError::Internal(e) => {
                error!(error = ?e, "request failed");
                "internal error".to_string()
            }
            AccountError::Unauthorized(_) => "invalid or expired token".to_string(),
            other => other.to_string(),
        };
        (
            status,
            Json(json!({
                "error": self.code(),
                "message": message,
            })),
        )
            .into_response()
    }
}
