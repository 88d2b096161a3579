use serde::{Deserialize, Serialize};

use super::validators::{
    is_blank, is_strong_password, is_valid_email, is_valid_name, MAX_BIO_LEN,
};
use crate::error::AccountError;

/// Request body for account creation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizeRequest {
    pub email: String,
    pub password: String,
}

/// Full replacement of the editable profile fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// ISO `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: Option<String>,
}

/// Response carrying a freshly issued session token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

fn unprocessable(reason: &str) -> AccountError {
    AccountError::Unprocessable(reason.into())
}

fn normalize_email(email: &mut String) {
    *email = email.trim().to_lowercase();
}

impl CreateUserRequest {
    pub fn validate(&mut self) -> Result<(), AccountError> {
        normalize_email(&mut self.email);
        if !is_valid_name(&self.name) {
            return Err(unprocessable("invalid name"));
        }
        if !is_valid_email(&self.email) {
            return Err(unprocessable("invalid email"));
        }
        if !is_strong_password(&self.password) {
            return Err(unprocessable("password does not meet policy"));
        }
        Ok(())
    }
}

impl AuthorizeRequest {
    pub fn validate(&mut self) -> Result<(), AccountError> {
        normalize_email(&mut self.email);
        if !is_valid_email(&self.email) {
            return Err(unprocessable("invalid email"));
        }
        if is_blank(&self.password) {
            return Err(unprocessable("password is required"));
        }
        Ok(())
    }
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Result<(), AccountError> {
        if !is_valid_name(&self.name) {
            return Err(unprocessable("invalid name"));
        }
        if self
            .bio
            .as_deref()
            .is_some_and(|b| b.chars().count() > MAX_BIO_LEN)
        {
            return Err(unprocessable("bio too long"));
        }
        Ok(())
    }
}
