//! Query types and the query lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::QueryLog;
use super::project::ProjectId;
use super::user::UserId;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A natural-language request processed by the external worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,

    /// Owning project. Fixed at creation.
    pub project: ProjectId,
    pub project_name: String,

    /// Submitting user. Fixed at creation.
    pub user: UserId,
    pub user_name: String,

    pub query_text: String,

    /// Empty until a worker reports completion.
    pub answer_text: String,

    pub status: Status,

    pub query_created: DateTime<Utc>,

    /// Stamped when a worker claims the query.
    pub query_started: Option<DateTime<Utc>>,

    /// Set iff `status` is terminal.
    pub query_finished: Option<DateTime<Utc>>,

    pub logs_count: i64,
}

/// A query together with its execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDetail {
    #[serde(flatten)]
    pub query: Query,
    pub logs: Vec<QueryLog>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct QueryId(pub i64);

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for a worker.
    Queued,
    /// Claimed by exactly one worker.
    InProgress,
    /// Answer produced. Terminal.
    Done,
    /// Worker gave up. Terminal.
    Failed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Queued,
        Status::InProgress,
        Status::Done,
        Status::Failed,
    ];

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Queued, InProgress) | (InProgress, Done) | (InProgress, Failed)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| crate::error::Error::Validation(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Body of a query submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuery {
    pub project: ProjectId,
    pub query_text: String,
}

impl NewQuery {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(crate::error::Error::Validation(
                "query_text must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filters for listing queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFilter {
    pub status: Option<Status>,
}

/// Final report from the worker that processed a query.
#[derive(Debug, Clone, Deserialize)]
pub struct Completion {
    pub status: Status,
    #[serde(default)]
    pub answer_text: String,
}

impl Completion {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.status.is_terminal() {
            return Err(crate::error::Error::Validation(format!(
                "completion status must be done or failed, got {}",
                self.status
            )));
        }
        Ok(())
    }
}
