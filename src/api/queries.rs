use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::extract::{JsonBody, PathParam, QueryParams};
use super::{AppState, PageParams};
use crate::model::Page;
use crate::model::ledger::QueryLog;
use crate::model::query::{Completion, NewQuery, Query, QueryDetail, QueryFilter, QueryId, Status};

pub const QUEUE_EMPTY_DETAIL: &str = "No queued queries available";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queries", get(list).post(create))
        .route("/queries/by_status", get(list))
        .route("/queries/claim_next", post(claim_next))
        .route("/queries/{id}", get(detail).delete(remove))
        .route("/queries/{id}/logs", get(logs))
        .route("/queries/{id}/complete", post(complete))
}

#[derive(Debug, Default, Deserialize)]
struct StatusParams {
    status: Option<String>,
}

impl StatusParams {
    fn into_filter(self) -> Result<QueryFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Status>()?),
        };
        Ok(QueryFilter { status })
    }
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    JsonBody(payload): JsonBody<NewQuery>,
) -> Result<(StatusCode, Json<Query>), ApiError> {
    let query = state
        .db
        .create_query(&current.scope, current.user.id, payload)
        .await?;
    state.notifier.dispatch(query.id);
    Ok((StatusCode::CREATED, Json(query)))
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(status): QueryParams<StatusParams>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<Query>>, ApiError> {
    let page = state
        .db
        .list_queries(&current.scope, status.into_filter()?, page.into())
        .await?;
    Ok(Json(page))
}

async fn detail(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<QueryDetail>, ApiError> {
    Ok(Json(
        state.db.get_query_detail(QueryId(id), &current.scope).await?,
    ))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_query(QueryId(id), &current.scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logs(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<QueryLog>>, ApiError> {
    let page = state
        .db
        .list_query_logs(QueryId(id), &current.scope, page.into())
        .await?;
    Ok(Json(page))
}

async fn claim_next(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Query>, ApiError> {
    match state.db.claim_next(&current.scope).await? {
        Some(query) => Ok(Json(query)),
        None => Err(ApiError::not_found(QUEUE_EMPTY_DETAIL)),
    }
}

async fn complete(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<Completion>,
) -> Result<Json<Query>, ApiError> {
    Ok(Json(
        state
            .db
            .complete_query(QueryId(id), &current.scope, payload)
            .await?,
    ))
}
