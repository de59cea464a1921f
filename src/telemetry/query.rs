//! Query lifecycle span helpers.

use tracing::Span;

use crate::model::query::{QueryId, Status};
use crate::scope::Scope;

/// Span around one `claim_next` call. `query.id` is filled in when a row
/// is claimed.
pub fn start_claim_span(scope: &Scope) -> Span {
    tracing::info_span!(
        "query.claim",
        "claim.scope" = %scope,
        "query.id" = tracing::field::Empty,
    )
}

/// Span around one push notification attempt.
pub fn start_notify_span(id: QueryId) -> Span {
    tracing::info_span!(
        "query.notify",
        "query.id" = id.0,
        "notify.outcome" = tracing::field::Empty,
    )
}

/// Record the claimed query on a claim span.
pub fn record_claimed(span: &Span, id: QueryId) {
    span.record("query.id", id.0);
}

/// Record a status transition event scoped to the given span.
pub fn record_state_transition(span: &Span, id: QueryId, from: Status, to: Status) {
    span.in_scope(|| {
        tracing::info!(query = id.0, from = %from, to = %to, "state_transition");
    });
}
