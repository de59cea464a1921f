use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::extract::{JsonBody, QueryParams};
use super::logs::QueryIdParams;
use super::{AppState, PageParams};
use crate::model::Page;
use crate::model::ledger::{NewTokenUsage, TokenUsage, UsageStats};
use crate::model::query::QueryId;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/token-usage", get(list).post(append))
        .route("/token-usage/statistics", get(statistics))
}

async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(filter): QueryParams<QueryIdParams>,
    QueryParams(page): QueryParams<PageParams>,
) -> Result<Json<Page<TokenUsage>>, ApiError> {
    let page = state
        .db
        .list_usage(&current.scope, filter.query_id.map(QueryId), page.into())
        .await?;
    Ok(Json(page))
}

async fn append(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    JsonBody(payload): JsonBody<NewTokenUsage>,
) -> Result<(StatusCode, Json<TokenUsage>), ApiError> {
    let usage = state.db.append_usage(&current.scope, payload).await?;
    Ok((StatusCode::CREATED, Json(usage)))
}

async fn statistics(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    QueryParams(filter): QueryParams<QueryIdParams>,
) -> Result<Json<UsageStats>, ApiError> {
    Ok(Json(
        state
            .db
            .usage_stats(&current.scope, filter.query_id.map(QueryId))
            .await?,
    ))
}
