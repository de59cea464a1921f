use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::extract::{JsonBody, PathParam, QueryParams};
use super::{AppState, PageParams};
use crate::model::Page;
use crate::model::project::{Project, ProjectId, ProjectTokens, ProjectUpdate};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list))
        .route("/projects/my_project", get(my_project))
        .route("/projects/my_project_tokens", get(my_project_tokens))
        .route("/projects/{id}", get(detail).patch(update))
        .route("/projects/{id}/tokens", get(tokens))
}

fn own_project(current: &CurrentUser) -> Result<ProjectId, ApiError> {
    current
        .user
        .project
        .ok_or_else(|| ApiError::not_found("user is not assigned to any project"))
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<Project>>, ApiError> {
    Ok(Json(
        state.db.list_projects(&current.scope, page.into()).await?,
    ))
}

async fn my_project(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Project>, ApiError> {
    let id = own_project(&current)?;
    Ok(Json(state.db.get_project(id, &current.scope).await?))
}

async fn my_project_tokens(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<ProjectTokens>, ApiError> {
    let id = own_project(&current)?;
    Ok(Json(state.db.project_tokens(id, &current.scope).await?))
}

async fn detail(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(
        state.db.get_project(ProjectId(id), &current.scope).await?,
    ))
}

async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<ProjectUpdate>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(
        state
            .db
            .update_project(ProjectId(id), &current.scope, payload)
            .await?,
    ))
}

async fn tokens(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<ProjectTokens>, ApiError> {
    Ok(Json(
        state.db.project_tokens(ProjectId(id), &current.scope).await?,
    ))
}
