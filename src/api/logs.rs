use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::extract::{JsonBody, PathParam, QueryParams};
use super::{AppState, PageParams};
use crate::model::Page;
use crate::model::ledger::{NewQueryLog, QueryLog};
use crate::model::query::QueryId;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logs", get(list).post(append))
        .route("/logs/{id}", get(detail))
}

/// `?query_id=` narrows ledger listings to one query.
#[derive(Debug, Default, Deserialize)]
pub struct QueryIdParams {
    pub query_id: Option<i64>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(filter): QueryParams<QueryIdParams>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<QueryLog>>, ApiError> {
    let page = state
        .db
        .list_logs(&current.scope, filter.query_id.map(QueryId), page.into())
        .await?;
    Ok(Json(page))
}

async fn append(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    JsonBody(payload): JsonBody<NewQueryLog>,
) -> Result<(StatusCode, Json<QueryLog>), ApiError> {
    let log = state.db.append_log(&current.scope, payload).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn detail(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<QueryLog>, ApiError> {
    Ok(Json(state.db.get_log(id, &current.scope).await?))
}
