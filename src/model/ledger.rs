//! Append-only execution logs and token-usage accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::project::ProjectId;
use super::query::QueryId;

// ---------------------------------------------------------------------------
// Execution logs
// ---------------------------------------------------------------------------

/// One execution-trace entry written by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: i64,
    pub project: ProjectId,
    pub query: QueryId,
    pub log_data: String,
    pub create_dtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQueryLog {
    pub project: ProjectId,
    pub query: QueryId,
    pub log_data: String,
}

// ---------------------------------------------------------------------------
// Token usage
// ---------------------------------------------------------------------------

/// Token counters reported by a model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounters {
    #[serde(default)]
    pub prompt_tokens: i32,
    #[serde(default)]
    pub completion_tokens: i32,
    #[serde(default)]
    pub total_tokens: i32,
    #[serde(default)]
    pub precached_prompt_tokens: i32,
    #[serde(default)]
    pub input_tokens: i32,
    #[serde(default)]
    pub output_tokens: i32,
}

impl TokenCounters {
    fn validate(&self) -> crate::error::Result<()> {
        let all = [
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            self.precached_prompt_tokens,
            self.input_tokens,
            self.output_tokens,
        ];
        if all.iter().any(|n| *n < 0) {
            return Err(crate::error::Error::Validation(
                "token counters must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Prompts exchanged with the agent for one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Exchange {
    pub request_to_ai_agent: String,
    pub ai_agent_answer: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub agent_prompt: String,
}

/// One accounting entry for a model call made while processing a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub id: i64,
    pub project: ProjectId,
    pub query: QueryId,
    pub ai_agent_name: String,
    pub model_name: String,
    pub model_role: String,
    #[serde(flatten)]
    pub exchange: Exchange,
    #[serde(flatten)]
    pub counters: TokenCounters,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTokenUsage {
    pub project: ProjectId,
    pub query: QueryId,
    pub ai_agent_name: String,
    pub model_name: String,
    pub model_role: String,
    #[serde(flatten)]
    pub exchange: Exchange,
    #[serde(flatten)]
    pub counters: TokenCounters,
}

const NAME_MAX: usize = 50;

impl NewTokenUsage {
    pub fn validate(&self) -> crate::error::Result<()> {
        for (field, value) in [
            ("ai_agent_name", &self.ai_agent_name),
            ("model_name", &self.model_name),
            ("model_role", &self.model_role),
        ] {
            if value.trim().is_empty() || value.chars().count() > NAME_MAX {
                return Err(crate::error::Error::Validation(format!(
                    "{field} must be 1-{NAME_MAX} characters"
                )));
            }
        }
        self.counters.validate()
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Token total and request count for one agent or model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageBucket {
    pub total: i64,
    pub count: i64,
}

/// Aggregated usage over the caller's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_tokens: i64,
    pub total_requests: i64,
    pub by_agent: BTreeMap<String, UsageBucket>,
    pub by_model: BTreeMap<String, UsageBucket>,
}

/// One `GROUP BY` row from the usage aggregation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UsageGroup {
    pub key: String,
    pub total: i64,
    pub count: i64,
}

impl UsageStats {
    /// Assemble the statistics object from the per-agent and per-model
    /// groups. Overall totals are derived from the agent groups, which
    /// partition the same row set.
    pub fn from_groups(agents: Vec<UsageGroup>, models: Vec<UsageGroup>) -> Self {
        let bucketize = |groups: Vec<UsageGroup>| {
            groups
                .into_iter()
                .map(|g| {
                    (
                        g.key,
                        UsageBucket {
                            total: g.total,
                            count: g.count,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>()
        };
        let by_agent = bucketize(agents);
        let by_model = bucketize(models);
        Self {
            total_tokens: by_agent.values().map(|b| b.total).sum(),
            total_requests: by_agent.values().map(|b| b.count).sum(),
            by_agent,
            by_model,
        }
    }
}
