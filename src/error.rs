//! Error types for webbuddy-rs.

use crate::model::query::{QueryId, Status};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown id, or a row outside the caller's scope.
    #[error("{0} not found")]
    NotFound(String),

    /// Row is visible but the caller may not mutate it.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation not allowed in the row's current status.
    #[error("query {id} is {status}: {reason}")]
    InvalidState {
        id: QueryId,
        status: Status,
        reason: String,
    },

    /// A guarded transition lost the compare-and-swap or is not an edge
    /// of the state machine.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
