//! Projects: the tenant boundary.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ProjectId(pub i64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public view of a project. Integration credentials are never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub project_name: String,
    pub test_it_project_id: String,
    pub jira_project_id: String,
    pub project_context: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project with its downstream integration credentials, for worker
/// identities acting on a claimed query.
#[derive(Debug, Serialize)]
pub struct ProjectTokens {
    #[serde(flatten)]
    pub project: Project,
    #[serde(serialize_with = "crate::config::secrets::serialize_exposed")]
    pub test_it_token: SecretString,
    #[serde(serialize_with = "crate::config::secrets::serialize_exposed")]
    pub jira_token: SecretString,
}

/// Partial update. Absent fields are left untouched; tokens are write-only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub project_name: Option<String>,
    pub test_it_token: Option<String>,
    pub test_it_project_id: Option<String>,
    pub jira_token: Option<String>,
    pub jira_project_id: Option<String>,
    pub project_context: Option<String>,
}

impl ProjectUpdate {
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(name) = &self.project_name {
            if name.trim().is_empty() || name.chars().count() > 128 {
                return Err(crate::error::Error::Validation(
                    "project_name must be 1-128 characters".to_string(),
                ));
            }
        }
        let limited = [
            ("test_it_token", &self.test_it_token),
            ("test_it_project_id", &self.test_it_project_id),
            ("jira_token", &self.jira_token),
            ("jira_project_id", &self.jira_project_id),
        ];
        for (field, value) in limited {
            if value.as_ref().is_some_and(|v| v.chars().count() > 128) {
                return Err(crate::error::Error::Validation(format!(
                    "{field} must be at most 128 characters"
                )));
            }
        }
        Ok(())
    }
}

/// Operator-side project creation.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub project_name: String,
    pub project_context: String,
}
