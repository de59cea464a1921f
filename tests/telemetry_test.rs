//! Integration tests for telemetry initialization and span helpers.

use webbuddy_rs::model::project::ProjectId;
use webbuddy_rs::model::query::{QueryId, Status};
use webbuddy_rs::scope::Scope;
use webbuddy_rs::telemetry::query;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so this may
    // return Err if another test got there first; that is acceptable.
    let config = webbuddy_rs::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "webbuddy-test".to_string(),
        default_filter: "debug".to_string(),
    };
    let _guard = webbuddy_rs::telemetry::init_telemetry(config);
}

#[test]
fn claim_span_records_claimed_query() {
    let span = query::start_claim_span(&Scope::Own(ProjectId(3)));
    query::record_claimed(&span, QueryId(11));
    query::record_state_transition(&span, QueryId(11), Status::Queued, Status::InProgress);
}

#[test]
fn notify_span_creates() {
    let span = query::start_notify_span(QueryId(11));
    span.record("notify.outcome", "delivered");
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;
    use webbuddy_rs::telemetry::metrics;

    metrics::claim_attempts().add(1, &[KeyValue::new("result", "empty")]);
    metrics::notify_outcomes().add(1, &[KeyValue::new("outcome", "disabled")]);
    metrics::operation_duration_ms().record(1.5, &[KeyValue::new("operation", "test")]);
}
