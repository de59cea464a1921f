use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::Error;

pub(crate) const ERROR_CODE_HEADER: &str = "x-error-code";

/// Error body returned by every endpoint: `{"detail": ..., "code": ...}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", detail)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => Self::not_found(err.to_string()),
            Error::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
            Error::InvalidState { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_STATE", err.to_string())
            }
            Error::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            Error::Validation(message) => Self::bad_request(message),
            Error::Unauthorized(message) => Self::unauthorized(message),
            Error::Database(_)
            | Error::Migration(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Other(_) => {
                error!(error = %err, "request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(json!({ "detail": self.detail, "code": self.code })),
        )
            .into_response();
        response.headers_mut().insert(
            HeaderName::from_static(ERROR_CODE_HEADER),
            HeaderValue::from_static(self.code),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::query::{QueryId, Status};
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        serde_json::from_slice(&body).expect("parse response json")
    }

    #[tokio::test]
    async fn not_found_carries_detail_and_code_header() {
        let response = ApiError::from(Error::NotFound("query #7".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get(ERROR_CODE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("NOT_FOUND")
        );
        let payload = body_of(response).await;
        assert_eq!(payload["detail"], json!("query #7 not found"));
        assert_eq!(payload["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn invalid_state_is_bad_request() {
        let err = Error::InvalidState {
            id: QueryId(3),
            status: Status::InProgress,
            reason: "only done or failed queries can be deleted".to_string(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_of(response).await;
        assert_eq!(payload["code"], json!("INVALID_STATE"));
        assert!(
            payload["detail"]
                .as_str()
                .unwrap_or_default()
                .contains("in_progress")
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_the_cause() {
        let err = Error::Other("connection string with password=hunter2".to_string());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = body_of(response).await;
        assert_eq!(payload["detail"], json!("internal server error"));
    }

    #[test]
    fn scope_errors_map_to_their_statuses() {
        assert_eq!(
            ApiError::from(Error::Forbidden("x".into())).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(Error::Unauthorized("x".into())).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(Error::Validation("x".into())).status,
            StatusCode::BAD_REQUEST
        );
    }
}
