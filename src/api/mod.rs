//! HTTP surface. Handlers translate between JSON and the store; every
//! rule about visibility and status lives in `db` and `scope`.

pub mod auth;
pub mod errors;
pub mod extract;
pub mod logs;
pub mod projects;
pub mod queries;
pub mod token_usage;
pub mod users;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::db::Db;
use crate::model::PageRequest;
use crate::notify::PushNotifier;

pub use errors::ApiError;

pub struct AppState {
    pub db: Db,
    pub notifier: Arc<PushNotifier>,
    pub token_ttl: chrono::Duration,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(queries::router())
        .merge(logs::router())
        .merge(token_usage::router())
        .merge(projects::router())
        .merge(users::router());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// `?page=&page_size=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(params.page, params.page_size)
    }
}
