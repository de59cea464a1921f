//! Metric instrument factories for webbuddy-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter(super::INSTRUMENTATION_SCOPE)
}

/// Counter: queries submitted.
/// Labels: `project`.
pub fn queries_created() -> Counter<u64> {
    meter()
        .u64_counter("webbuddy.query.created")
        .with_description("Number of queries submitted")
        .build()
}

/// Counter: query status transitions.
/// Labels: `from`, `to`.
pub fn query_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("webbuddy.query.state_transitions")
        .with_description("Number of query status transitions")
        .build()
}

/// Counter: claim attempts.
/// Labels: `result` ("claimed" | "empty").
pub fn claim_attempts() -> Counter<u64> {
    meter()
        .u64_counter("webbuddy.claim.attempts")
        .with_description("Number of claim_next calls by outcome")
        .build()
}

/// Counter: push notification outcomes.
/// Labels: `outcome` ("delivered" | "rejected" | "timeout" | "unreachable" | "error" | "disabled").
pub fn notify_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("webbuddy.notify.outcomes")
        .with_description("Worker push notification outcomes")
        .build()
}

/// Counter: LLM tokens recorded in the usage ledger.
/// Labels: `agent`, `model`.
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("webbuddy.llm.tokens")
        .with_description("LLM tokens recorded in the usage ledger")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("webbuddy.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
