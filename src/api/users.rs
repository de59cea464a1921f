use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::extract::{JsonBody, QueryParams};
use super::{AppState, PageParams};
use crate::model::Page;
use crate::model::user::{Credentials, PasswordChange, User};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/users", get(list))
        .route("/users/me", get(me))
        .route("/users/change_password", post(change_password))
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let (token, user) = state.db.login(&payload, state.token_ttl).await?;
    Ok(Json(LoginResponse { token, user }))
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<User>>, ApiError> {
    Ok(Json(state.db.list_users(&current.scope, page.into()).await?))
}

async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    JsonBody(payload): JsonBody<PasswordChange>,
) -> Result<Json<Value>, ApiError> {
    state.db.change_password(current.user.id, &payload).await?;
    Ok(Json(json!({ "detail": "Password changed successfully" })))
}
