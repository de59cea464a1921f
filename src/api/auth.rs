//! Bearer authentication.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::AppState;
use super::errors::ApiError;
use crate::model::user::User;
use crate::scope::Scope;

/// The authenticated caller and the visibility scope derived from it,
/// computed once per request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub scope: Scope,
}

/// Accepts `Authorization: Bearer <token>` and the `Token <token>` form.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (kind, token) = raw.split_once(' ')?;
    if !(kind.eq_ignore_ascii_case("bearer") || kind.eq_ignore_ascii_case("token")) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("authentication credentials were not provided"))?;
    let user = state.db.authenticate(&token).await?;
    let scope = Scope::for_user(&user);
    Ok(CurrentUser { user, scope })
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(state, &parts.headers).await
    }
}
