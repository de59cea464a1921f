//! Project store.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::project::*;
use crate::model::{Page, PageRequest};
use crate::scope::Scope;

const SELECT_PROJECT: &str = "SELECT id, project_name, test_it_project_id, jira_project_id,
        project_context, created_at, updated_at, test_it_token, jira_token
     FROM projects";

impl super::Db {
    pub async fn create_project(&self, new: NewProject) -> Result<Project> {
        if new.project_name.trim().is_empty() || new.project_name.chars().count() > 128 {
            return Err(Error::Validation(
                "project_name must be 1-128 characters".to_string(),
            ));
        }

        let row: ProjectRow = sqlx::query_as(&format!(
            "WITH inserted AS (
                INSERT INTO projects (project_name, project_context) VALUES ($1, $2)
                RETURNING *
             )
             {}",
            SELECT_PROJECT.replace("FROM projects", "FROM inserted")
        ))
        .bind(&new.project_name)
        .bind(&new.project_context)
        .fetch_one(self.pool())
        .await?;

        info!(project = row.id.0, name = %row.project_name, "project created");
        Ok(row.into_project())
    }

    pub async fn list_projects(&self, scope: &Scope, page: PageRequest) -> Result<Page<Project>> {
        let (all, project) = scope.sql_filter();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM projects WHERE ($1 OR id = $2)")
                .bind(all)
                .bind(project)
                .fetch_one(self.pool())
                .await?;

        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "{SELECT_PROJECT} WHERE ($1 OR id = $2) ORDER BY id LIMIT $3 OFFSET $4"
        ))
        .bind(all)
        .bind(project)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        Ok(Page::new(
            page,
            count,
            rows.into_iter().map(ProjectRow::into_project).collect(),
        ))
    }

    /// Get a project by ID. Projects outside `scope` are `NotFound`.
    pub async fn get_project(&self, id: ProjectId, scope: &Scope) -> Result<Project> {
        Ok(self.project_row(id, scope).await?.into_project())
    }

    /// The project together with its integration credentials.
    pub async fn project_tokens(&self, id: ProjectId, scope: &Scope) -> Result<ProjectTokens> {
        Ok(self.project_row(id, scope).await?.into_tokens())
    }

    /// Apply a partial update. Secrets are write-only through this path.
    pub async fn update_project(
        &self,
        id: ProjectId,
        scope: &Scope,
        update: ProjectUpdate,
    ) -> Result<Project> {
        update.validate()?;
        self.project_row(id, scope).await?;
        scope.authorize_write(id, "project")?;

        let row: ProjectRow = sqlx::query_as(&format!(
            "WITH updated AS (
                UPDATE projects SET
                    project_name = COALESCE($2, project_name),
                    test_it_token = COALESCE($3, test_it_token),
                    test_it_project_id = COALESCE($4, test_it_project_id),
                    jira_token = COALESCE($5, jira_token),
                    jira_project_id = COALESCE($6, jira_project_id),
                    project_context = COALESCE($7, project_context),
                    updated_at = now()
                WHERE id = $1
                RETURNING *
             )
             {}",
            SELECT_PROJECT.replace("FROM projects", "FROM updated")
        ))
        .bind(id)
        .bind(&update.project_name)
        .bind(&update.test_it_token)
        .bind(&update.test_it_project_id)
        .bind(&update.jira_token)
        .bind(&update.jira_project_id)
        .bind(&update.project_context)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {id}")))?;

        info!(project = id.0, "project updated");
        Ok(row.into_project())
    }

    async fn project_row(&self, id: ProjectId, scope: &Scope) -> Result<ProjectRow> {
        let (all, project) = scope.sql_filter();
        sqlx::query_as(&format!(
            "{SELECT_PROJECT} WHERE id = $1 AND ($2 OR id = $3)"
        ))
        .bind(id)
        .bind(all)
        .bind(project)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {id}")))
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: ProjectId,
    project_name: String,
    test_it_project_id: String,
    jira_project_id: String,
    project_context: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    test_it_token: String,
    jira_token: String,
}

impl ProjectRow {
    fn into_project(self) -> Project {
        self.into_tokens().project
    }

    fn into_tokens(self) -> ProjectTokens {
        ProjectTokens {
            project: Project {
                id: self.id,
                project_name: self.project_name,
                test_it_project_id: self.test_it_project_id,
                jira_project_id: self.jira_project_id,
                project_context: self.project_context,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            test_it_token: SecretString::from(self.test_it_token),
            jira_token: SecretString::from(self.jira_token),
        }
    }
}
