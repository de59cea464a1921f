//! Query store and claim coordinator.
//!
//! Every status change is a guarded update (`WHERE id = $n AND status =
//! $from`), so concurrent writers can never clobber each other's
//! transitions. Claiming uses `FOR UPDATE SKIP LOCKED`: concurrent claimers
//! race over disjoint candidates and a caller that finds nothing unlocked
//! returns immediately.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::PgExecutor;
use tracing::{Instrument, debug, info};

use crate::error::{Error, Result};
use crate::model::project::ProjectId;
use crate::model::query::*;
use crate::model::user::UserId;
use crate::model::{Page, PageRequest};
use crate::scope::Scope;
use crate::telemetry::metrics;
use crate::telemetry::query::{record_claimed, record_state_transition, start_claim_span};

const SELECT_QUERY: &str = "SELECT q.id, q.project_id, p.project_name, q.user_id, u.username AS user_name,
        q.query_text, q.answer_text, q.status, q.query_created, q.query_started, q.query_finished,
        (SELECT COUNT(*) FROM query_logs l WHERE l.query_id = q.id) AS logs_count
     FROM queries q
     JOIN projects p ON p.id = q.project_id
     JOIN users u ON u.id = q.user_id";

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Guarded compare-and-swap on `status`. Returns whether the row moved.
///
/// Entering `in_progress` stamps `query_started`; entering a terminal status
/// stamps `query_finished` and stores the answer.
async fn transition_on<'e, E: PgExecutor<'e>>(
    executor: E,
    id: QueryId,
    from: Status,
    to: Status,
    answer_text: Option<&str>,
) -> Result<bool> {
    validate_transition(from, to)?;

    let now = Utc::now();
    let started_at = (to == Status::InProgress).then_some(now);
    let finished_at = to.is_terminal().then_some(now);

    let rows_affected = sqlx::query(
        "UPDATE queries SET status = $1,
                query_started = COALESCE($2, query_started),
                query_finished = COALESCE($3, query_finished),
                answer_text = COALESCE($4, answer_text)
         WHERE id = $5 AND status = $6",
    )
    .bind(to.as_str())
    .bind(started_at)
    .bind(finished_at)
    .bind(answer_text)
    .bind(id)
    .bind(from.as_str())
    .execute(executor)
    .await?
    .rows_affected();

    if rows_affected == 1 {
        metrics::query_state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
    }
    Ok(rows_affected == 1)
}

impl super::Db {
    /// Insert a new query in `queued` status.
    ///
    /// The caller must be allowed to write into `new.project`. Push
    /// notification is the API layer's job and happens after this returns.
    pub async fn create_query(&self, scope: &Scope, user: UserId, new: NewQuery) -> Result<Query> {
        new.validate()?;
        scope.authorize_write(new.project, "project")?;

        let project_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM projects WHERE id = $1)")
                .bind(new.project)
                .fetch_one(self.pool())
                .await?;
        if !project_exists.0 {
            return Err(Error::Validation(format!("invalid project {}", new.project)));
        }

        let (id,): (QueryId,) = sqlx::query_as(
            "INSERT INTO queries (project_id, user_id, query_text, status)
             VALUES ($1, $2, $3, 'queued')
             RETURNING id",
        )
        .bind(new.project)
        .bind(user)
        .bind(&new.query_text)
        .fetch_one(self.pool())
        .await?;

        metrics::queries_created().add(1, &[KeyValue::new("project", new.project.0)]);
        info!(query = id.0, project = new.project.0, user = user.0, "query queued");

        self.get_query(id, &Scope::All).await
    }

    /// Get a query by ID. Rows outside `scope` are `NotFound`.
    pub async fn get_query(&self, id: QueryId, scope: &Scope) -> Result<Query> {
        let (all, project) = scope.sql_filter();
        let row: Option<QueryRow> = sqlx::query_as(&format!(
            "{SELECT_QUERY} WHERE q.id = $1 AND ($2 OR q.project_id = $3)"
        ))
        .bind(id)
        .bind(all)
        .bind(project)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("query {id}")))?
            .try_into_query()
    }

    /// Get a query with its full execution trace.
    pub async fn get_query_detail(&self, id: QueryId, scope: &Scope) -> Result<QueryDetail> {
        let query = self.get_query(id, scope).await?;
        let logs = self.all_logs_for_query(id).await?;
        Ok(QueryDetail { query, logs })
    }

    /// List queries visible in `scope`, newest first.
    pub async fn list_queries(
        &self,
        scope: &Scope,
        filter: QueryFilter,
        page: PageRequest,
    ) -> Result<Page<Query>> {
        let (all, project) = scope.sql_filter();
        let status = filter.status.map(Status::as_str);

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM queries q
             WHERE ($1 OR q.project_id = $2) AND ($3::text IS NULL OR q.status = $3)",
        )
        .bind(all)
        .bind(project)
        .bind(status)
        .fetch_one(self.pool())
        .await?;

        let rows: Vec<QueryRow> = sqlx::query_as(&format!(
            "{SELECT_QUERY}
             WHERE ($1 OR q.project_id = $2) AND ($3::text IS NULL OR q.status = $3)
             ORDER BY q.query_created DESC, q.id DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(all)
        .bind(project)
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        let results = rows
            .into_iter()
            .map(QueryRow::try_into_query)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(page, count, results))
    }

    /// Delete a finished query. Its logs and usage entries go with it.
    pub async fn delete_query(&self, id: QueryId, scope: &Scope) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let row: Option<(ProjectId, String)> =
            sqlx::query_as("SELECT project_id, status FROM queries WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let (project, status) = match row {
            Some((project, status)) if scope.permits(project) => (project, status.parse::<Status>()?),
            _ => return Err(Error::NotFound(format!("query {id}"))),
        };
        scope.authorize_write(project, "query")?;

        if !status.is_terminal() {
            return Err(Error::InvalidState {
                id,
                status,
                reason: "only done or failed queries can be deleted".to_string(),
            });
        }

        sqlx::query("DELETE FROM queries WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(query = id.0, %status, "query deleted");
        Ok(())
    }

    /// Transition a query's status with optimistic concurrency.
    ///
    /// Fails with `InvalidTransition` if the row is not currently in `from`.
    pub async fn transition_query(
        &self,
        id: QueryId,
        from: Status,
        to: Status,
        answer_text: Option<&str>,
    ) -> Result<Query> {
        if !transition_on(self.pool(), id, from, to, answer_text).await? {
            return Err(Error::InvalidTransition { from, to });
        }
        self.get_query(id, &Scope::All).await
    }

    /// Atomically claim the oldest queued query visible in `scope`.
    ///
    /// Returns `None` when the queue is empty or every queued row is
    /// currently locked by another claimant. Never waits on a lock.
    pub async fn claim_next(&self, scope: &Scope) -> Result<Option<Query>> {
        let span = start_claim_span(scope);
        let started = std::time::Instant::now();

        let claimed = async {
            let (all, project) = scope.sql_filter();
            let mut tx = self.pool().begin().await?;

            let candidate: Option<(QueryId,)> = sqlx::query_as(
                "SELECT id FROM queries
                 WHERE status = 'queued' AND ($1 OR project_id = $2)
                 ORDER BY query_created, id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED",
            )
            .bind(all)
            .bind(project)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((id,)) = candidate else {
                tx.rollback().await?;
                debug!("no claimable query");
                return Ok::<_, Error>(None);
            };

            // The row lock makes this CAS uncontended; a miss still reads as
            // an empty queue rather than an error.
            if !transition_on(&mut *tx, id, Status::Queued, Status::InProgress, None).await? {
                tx.rollback().await?;
                return Ok(None);
            }
            tx.commit().await?;

            record_claimed(&tracing::Span::current(), id);
            record_state_transition(
                &tracing::Span::current(),
                id,
                Status::Queued,
                Status::InProgress,
            );
            Ok(Some(id))
        }
        .instrument(span)
        .await?;

        metrics::claim_attempts().add(
            1,
            &[KeyValue::new(
                "result",
                if claimed.is_some() { "claimed" } else { "empty" },
            )],
        );
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "query.claim")],
        );

        match claimed {
            Some(id) => self.get_query(id, &Scope::All).await.map(Some),
            None => Ok(None),
        }
    }

    /// Record a worker's final report: `in_progress` → `done` | `failed`.
    pub async fn complete_query(
        &self,
        id: QueryId,
        scope: &Scope,
        completion: Completion,
    ) -> Result<Query> {
        completion.validate()?;
        let current = self.get_query(id, scope).await?;
        scope.authorize_write(current.project, "query")?;

        let invalid = |status| Error::InvalidState {
            id,
            status,
            reason: "only in_progress queries can be completed".to_string(),
        };
        if current.status != Status::InProgress {
            return Err(invalid(current.status));
        }

        if !transition_on(
            self.pool(),
            id,
            Status::InProgress,
            completion.status,
            Some(&completion.answer_text),
        )
        .await?
        {
            // Lost a race with another completion report.
            let latest = self.get_query(id, &Scope::All).await?;
            return Err(invalid(latest.status));
        }

        info!(query = id.0, status = %completion.status, "query finished");
        self.get_query(id, &Scope::All).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct QueryRow {
    id: QueryId,
    project_id: ProjectId,
    project_name: String,
    user_id: UserId,
    user_name: String,
    query_text: String,
    answer_text: String,
    status: String,
    query_created: DateTime<Utc>,
    query_started: Option<DateTime<Utc>>,
    query_finished: Option<DateTime<Utc>>,
    logs_count: i64,
}

impl QueryRow {
    fn try_into_query(self) -> Result<Query> {
        Ok(Query {
            id: self.id,
            project: self.project_id,
            project_name: self.project_name,
            user: self.user_id,
            user_name: self.user_name,
            query_text: self.query_text,
            answer_text: self.answer_text,
            status: self.status.parse()?,
            query_created: self.query_created,
            query_started: self.query_started,
            query_finished: self.query_finished,
            logs_count: self.logs_count,
        })
    }
}
