//! # webbuddy-rs
//!
//! Durable query queue for AI-agent workers.
//!
//! Users submit natural-language queries against a project; worker
//! processes claim them atomically from Postgres, stream execution logs and
//! token usage back, and report a final answer. A best-effort push tells the
//! worker dispatcher when new work arrives.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod scope;
pub mod telemetry;
