use std::future::Future;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthorizeRequest, CreateUserRequest, TokenResponse, UpdateProfileRequest},
    repo_types::Profile,
};
use crate::{auth::extractors::AuthUser, error::AccountError, state::AppState};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/user", post(create_user))
        .route("/authorize", post(authorize))
        .route("/authorize/email/challenge/:code", get(enable_user))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user", axum::routing::patch(update_self))
        .route(
            "/user/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

/// Runs a mutation on its own task so a dropped connection cannot cancel it
/// between the write and the cache invalidation.
async fn detached<T, F>(fut: F) -> Result<T, AccountError>
where
    F: Future<Output = Result<T, AccountError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut).await.context("request task failed")?
}

fn parse_id(raw: &str) -> Result<i64, AccountError> {
    raw.parse::<i64>()
        .map_err(|_| AccountError::Unprocessable("user id must be an integer".into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AccountError> {
    payload.validate()?;
    let accounts = state.accounts.clone();
    let token = detached(async move {
        accounts
            .create(&payload.email, &payload.name, &payload.password)
            .await
    })
    .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[instrument(skip(state, payload))]
pub async fn authorize(
    State(state): State<AppState>,
    Json(mut payload): Json<AuthorizeRequest>,
) -> Result<Json<TokenResponse>, AccountError> {
    payload.validate()?;
    let token = state
        .accounts
        .authorize(&payload.email, &payload.password)
        .await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip_all)]
pub async fn enable_user(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<TokenResponse>, AccountError> {
    let accounts = state.accounts.clone();
    let token = detached(async move { accounts.enable(&code).await }).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(auth_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Profile>, AccountError> {
    let target = parse_id(&id)?;
    let profile = state.accounts.get_profile(target, auth_id).await?;
    Ok(Json(profile))
}

async fn apply_update(
    state: AppState,
    target: i64,
    auth_id: i64,
    payload: UpdateProfileRequest,
) -> Result<StatusCode, AccountError> {
    payload.validate()?;
    let accounts = state.accounts.clone();
    detached(async move { accounts.update_profile(target, auth_id, payload).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_self(
    State(state): State<AppState>,
    AuthUser(auth_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<StatusCode, AccountError> {
    apply_update(state, auth_id, auth_id, payload).await
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(auth_id): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<StatusCode, AccountError> {
    let target = parse_id(&id)?;
    apply_update(state, target, auth_id, payload).await
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(auth_id): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AccountError> {
    let target = parse_id(&id)?;
    let accounts = state.accounts.clone();
    detached(async move { accounts.delete_account(target, auth_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}
