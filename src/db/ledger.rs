//! Execution logs and token-usage ledger. Insert and read only.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;

use crate::error::{Error, Result};
use crate::model::ledger::*;
use crate::model::project::ProjectId;
use crate::model::query::QueryId;
use crate::model::{Page, PageRequest};
use crate::scope::Scope;
use crate::telemetry::metrics;

const SELECT_USAGE: &str = "SELECT id, project_id, query_id, ai_agent_name, model_name, model_role,
        request_to_ai_agent, ai_agent_answer, system_prompt, user_prompt, agent_prompt,
        prompt_tokens, completion_tokens, total_tokens, precached_prompt_tokens,
        input_tokens, output_tokens, datetime
     FROM token_usage_logs";

impl super::Db {
    /// Resolve the project that owns `query` and check the caller may write
    /// ledger rows for it. `claimed_project` is the project named in the
    /// request body and must agree with the query's.
    async fn ledger_target(
        &self,
        scope: &Scope,
        query: QueryId,
        claimed_project: ProjectId,
    ) -> Result<ProjectId> {
        let row: Option<(ProjectId,)> = sqlx::query_as("SELECT project_id FROM queries WHERE id = $1")
            .bind(query)
            .fetch_optional(self.pool())
            .await?;
        let project = match row {
            Some((project,)) if scope.permits(project) => project,
            _ => return Err(Error::NotFound(format!("query {query}"))),
        };
        scope.authorize_write(project, "query")?;
        if project != claimed_project {
            return Err(Error::Validation(format!(
                "query {query} belongs to project {project}, not {claimed_project}"
            )));
        }
        Ok(project)
    }

    // -----------------------------------------------------------------------
    // Execution logs
    // -----------------------------------------------------------------------

    /// Append one execution-trace entry. Never touches the query row.
    pub async fn append_log(&self, scope: &Scope, new: NewQueryLog) -> Result<QueryLog> {
        let project = self.ledger_target(scope, new.query, new.project).await?;

        let row: QueryLogRow = sqlx::query_as(
            "INSERT INTO query_logs (project_id, query_id, log_data)
             VALUES ($1, $2, $3)
             RETURNING id, project_id, query_id, log_data, create_dtime",
        )
        .bind(project)
        .bind(new.query)
        .bind(&new.log_data)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }

    pub async fn get_log(&self, id: i64, scope: &Scope) -> Result<QueryLog> {
        let (all, project) = scope.sql_filter();
        let row: Option<QueryLogRow> = sqlx::query_as(
            "SELECT id, project_id, query_id, log_data, create_dtime FROM query_logs
             WHERE id = $1 AND ($2 OR project_id = $3)",
        )
        .bind(id)
        .bind(all)
        .bind(project)
        .fetch_optional(self.pool())
        .await?;
        row.map(QueryLog::from)
            .ok_or_else(|| Error::NotFound(format!("log {id}")))
    }

    /// Logs visible in `scope`, optionally limited to one query, oldest first.
    pub async fn list_logs(
        &self,
        scope: &Scope,
        query: Option<QueryId>,
        page: PageRequest,
    ) -> Result<Page<QueryLog>> {
        let (all, project) = scope.sql_filter();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM query_logs
             WHERE ($1 OR project_id = $2) AND ($3::bigint IS NULL OR query_id = $3)",
        )
        .bind(all)
        .bind(project)
        .bind(query)
        .fetch_one(self.pool())
        .await?;

        let rows: Vec<QueryLogRow> = sqlx::query_as(
            "SELECT id, project_id, query_id, log_data, create_dtime FROM query_logs
             WHERE ($1 OR project_id = $2) AND ($3::bigint IS NULL OR query_id = $3)
             ORDER BY create_dtime ASC, id ASC
             LIMIT $4 OFFSET $5",
        )
        .bind(all)
        .bind(project)
        .bind(query)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        Ok(Page::new(
            page,
            count,
            rows.into_iter().map(QueryLog::from).collect(),
        ))
    }

    /// Paginated trace of one query. The query itself must be in scope.
    pub async fn list_query_logs(
        &self,
        id: QueryId,
        scope: &Scope,
        page: PageRequest,
    ) -> Result<Page<QueryLog>> {
        self.get_query(id, scope).await?;
        self.list_logs(scope, Some(id), page).await
    }

    /// Whole trace of one query, for the detail view. Caller checks scope.
    pub(crate) async fn all_logs_for_query(&self, id: QueryId) -> Result<Vec<QueryLog>> {
        let rows: Vec<QueryLogRow> = sqlx::query_as(
            "SELECT id, project_id, query_id, log_data, create_dtime FROM query_logs
             WHERE query_id = $1
             ORDER BY create_dtime ASC, id ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(QueryLog::from).collect())
    }

    // -----------------------------------------------------------------------
    // Token usage
    // -----------------------------------------------------------------------

    /// Append one accounting entry.
    pub async fn append_usage(&self, scope: &Scope, new: NewTokenUsage) -> Result<TokenUsage> {
        new.validate()?;
        let project = self.ledger_target(scope, new.query, new.project).await?;

        let row: TokenUsageRow = sqlx::query_as(&format!(
            "WITH inserted AS (
                INSERT INTO token_usage_logs (project_id, query_id, ai_agent_name, model_name, model_role,
                    request_to_ai_agent, ai_agent_answer, system_prompt, user_prompt, agent_prompt,
                    prompt_tokens, completion_tokens, total_tokens, precached_prompt_tokens,
                    input_tokens, output_tokens)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                RETURNING *
             )
             {} ",
            SELECT_USAGE.replace("FROM token_usage_logs", "FROM inserted")
        ))
        .bind(project)
        .bind(new.query)
        .bind(&new.ai_agent_name)
        .bind(&new.model_name)
        .bind(&new.model_role)
        .bind(&new.exchange.request_to_ai_agent)
        .bind(&new.exchange.ai_agent_answer)
        .bind(&new.exchange.system_prompt)
        .bind(&new.exchange.user_prompt)
        .bind(&new.exchange.agent_prompt)
        .bind(new.counters.prompt_tokens)
        .bind(new.counters.completion_tokens)
        .bind(new.counters.total_tokens)
        .bind(new.counters.precached_prompt_tokens)
        .bind(new.counters.input_tokens)
        .bind(new.counters.output_tokens)
        .fetch_one(self.pool())
        .await?;

        metrics::llm_tokens().add(
            u64::try_from(new.counters.total_tokens).unwrap_or(0),
            &[
                KeyValue::new("agent", new.ai_agent_name.clone()),
                KeyValue::new("model", new.model_name.clone()),
            ],
        );
        Ok(row.into())
    }

    /// Usage entries visible in `scope`, newest first.
    pub async fn list_usage(
        &self,
        scope: &Scope,
        query: Option<QueryId>,
        page: PageRequest,
    ) -> Result<Page<TokenUsage>> {
        let (all, project) = scope.sql_filter();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM token_usage_logs
             WHERE ($1 OR project_id = $2) AND ($3::bigint IS NULL OR query_id = $3)",
        )
        .bind(all)
        .bind(project)
        .bind(query)
        .fetch_one(self.pool())
        .await?;

        let rows: Vec<TokenUsageRow> = sqlx::query_as(&format!(
            "{SELECT_USAGE}
             WHERE ($1 OR project_id = $2) AND ($3::bigint IS NULL OR query_id = $3)
             ORDER BY datetime DESC, id DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(all)
        .bind(project)
        .bind(query)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        Ok(Page::new(
            page,
            count,
            rows.into_iter().map(TokenUsage::from).collect(),
        ))
    }

    /// Aggregate usage over the scoped rows at read time.
    ///
    /// Both groupings run in one repeatable-read snapshot so the per-agent
    /// and per-model views describe the same rows even under concurrent
    /// inserts.
    pub async fn usage_stats(&self, scope: &Scope, query: Option<QueryId>) -> Result<UsageStats> {
        let (all, project) = scope.sql_filter();
        let mut tx = self.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let grouped = |column: &str| {
            format!(
                "SELECT {column} AS key, COALESCE(SUM(total_tokens), 0)::BIGINT AS total, COUNT(*) AS count
                 FROM token_usage_logs
                 WHERE ($1 OR project_id = $2) AND ($3::bigint IS NULL OR query_id = $3)
                 GROUP BY {column}
                 ORDER BY {column}"
            )
        };

        let agents: Vec<UsageGroup> = sqlx::query_as(&grouped("ai_agent_name"))
            .bind(all)
            .bind(project)
            .bind(query)
            .fetch_all(&mut *tx)
            .await?;
        let models: Vec<UsageGroup> = sqlx::query_as(&grouped("model_name"))
            .bind(all)
            .bind(project)
            .bind(query)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(UsageStats::from_groups(agents, models))
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct QueryLogRow {
    id: i64,
    project_id: ProjectId,
    query_id: QueryId,
    log_data: String,
    create_dtime: DateTime<Utc>,
}

impl From<QueryLogRow> for QueryLog {
    fn from(row: QueryLogRow) -> Self {
        Self {
            id: row.id,
            project: row.project_id,
            query: row.query_id,
            log_data: row.log_data,
            create_dtime: row.create_dtime,
        }
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TokenUsageRow {
    id: i64,
    project_id: ProjectId,
    query_id: QueryId,
    ai_agent_name: String,
    model_name: String,
    model_role: String,
    request_to_ai_agent: String,
    ai_agent_answer: String,
    system_prompt: String,
    user_prompt: String,
    agent_prompt: String,
    prompt_tokens: i32,
    completion_tokens: i32,
    total_tokens: i32,
    precached_prompt_tokens: i32,
    input_tokens: i32,
    output_tokens: i32,
    datetime: DateTime<Utc>,
}

impl From<TokenUsageRow> for TokenUsage {
    fn from(row: TokenUsageRow) -> Self {
        Self {
            id: row.id,
            project: row.project_id,
            query: row.query_id,
            ai_agent_name: row.ai_agent_name,
            model_name: row.model_name,
            model_role: row.model_role,
            exchange: Exchange {
                request_to_ai_agent: row.request_to_ai_agent,
                ai_agent_answer: row.ai_agent_answer,
                system_prompt: row.system_prompt,
                user_prompt: row.user_prompt,
                agent_prompt: row.agent_prompt,
            },
            counters: TokenCounters {
                prompt_tokens: row.prompt_tokens,
                completion_tokens: row.completion_tokens,
                total_tokens: row.total_tokens,
                precached_prompt_tokens: row.precached_prompt_tokens,
                input_tokens: row.input_tokens,
                output_tokens: row.output_tokens,
            },
            datetime: row.datetime,
        }
    }
}
