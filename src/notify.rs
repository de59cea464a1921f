//! Fire-and-forget push notification to the worker dispatcher.
//!
//! After a query is created the dispatcher is told about it so a worker can
//! claim it without waiting for its next poll. Delivery is best effort: one
//! attempt, bounded by the configured timeout, never retried. Workers that
//! miss a push still find the query through `claim_next`.

use std::sync::Arc;

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{Instrument, debug, warn};

use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use crate::model::query::QueryId;
use crate::telemetry::metrics;
use crate::telemetry::query::start_notify_span;

/// Path on the dispatcher that receives new-query pushes.
pub const PROCESS_QUERY_PATH: &str = "/api/process-query";

#[derive(Debug, Serialize)]
struct ProcessQuery<'a> {
    query_id: QueryId,
    webbuddy_url: &'a str,
}

/// What happened to one notification attempt. Only ever logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// The dispatcher answered with a non-success status.
    Rejected(u16),
    TimedOut,
    /// Connection could not be established.
    Unreachable,
    Failed(String),
    /// No dispatcher URL is configured.
    Disabled,
}

impl NotifyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            NotifyOutcome::Delivered => "delivered",
            NotifyOutcome::Rejected(_) => "rejected",
            NotifyOutcome::TimedOut => "timeout",
            NotifyOutcome::Unreachable => "unreachable",
            NotifyOutcome::Failed(_) => "error",
            NotifyOutcome::Disabled => "disabled",
        }
    }
}

pub struct PushNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl PushNotifier {
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build notify client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Make one delivery attempt and report how it went.
    ///
    /// The whole attempt, connect included, is bounded by the configured
    /// timeout. Nothing here returns an error.
    pub async fn notify(&self, id: QueryId) -> NotifyOutcome {
        let span = start_notify_span(id);
        async {
            let outcome = self.attempt(id).await;
            tracing::Span::current().record("notify.outcome", outcome.label());
            match &outcome {
                NotifyOutcome::Delivered => debug!(query = id.0, "worker notified"),
                NotifyOutcome::Disabled => debug!(query = id.0, "worker notification disabled"),
                other => warn!(query = id.0, outcome = ?other, "worker notification failed"),
            }
            metrics::notify_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, id: QueryId) -> NotifyOutcome {
        let Some(base) = self.config.worker_url.as_deref() else {
            return NotifyOutcome::Disabled;
        };
        let body = ProcessQuery {
            query_id: id,
            webbuddy_url: &self.config.public_url,
        };
        let request = self
            .client
            .post(format!("{base}{PROCESS_QUERY_PATH}"))
            .json(&body)
            .send();

        match tokio::time::timeout(self.config.timeout, request).await {
            Err(_) => NotifyOutcome::TimedOut,
            Ok(Ok(response)) if response.status().is_success() => NotifyOutcome::Delivered,
            Ok(Ok(response)) => NotifyOutcome::Rejected(response.status().as_u16()),
            Ok(Err(e)) if e.is_timeout() => NotifyOutcome::TimedOut,
            Ok(Err(e)) if e.is_connect() => NotifyOutcome::Unreachable,
            Ok(Err(e)) => NotifyOutcome::Failed(e.to_string()),
        }
    }

    /// Notify on a detached task. Returns immediately; the outcome is never
    /// observed by the caller.
    pub fn dispatch(self: &Arc<Self>, id: QueryId) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            notifier.notify(id).await;
        });
    }
}
