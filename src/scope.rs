//! Row-level visibility.
//!
//! Every store call takes a [`Scope`], computed once per request from the
//! authenticated user. Reads filter by it; writes re-check ownership at the
//! point of mutation via [`Scope::authorize_write`].

use crate::error::{Error, Result};
use crate::model::project::ProjectId;
use crate::model::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Rows of one project only.
    Own(ProjectId),
    /// Every row (admin, service, superuser).
    All,
    /// A standard account with no project. Sees nothing.
    Unassigned,
}

impl Scope {
    pub fn for_user(user: &User) -> Self {
        if user.has_cross_project_access() {
            return Scope::All;
        }
        match user.project {
            Some(project) => Scope::Own(project),
            None => Scope::Unassigned,
        }
    }

    /// Is a row of `project` visible under this scope?
    pub fn permits(&self, project: ProjectId) -> bool {
        match self {
            Scope::All => true,
            Scope::Own(own) => *own == project,
            Scope::Unassigned => false,
        }
    }

    /// Re-check at the point of mutation. Scope visibility is necessary but
    /// not sufficient: rows outside it stay `NotFound`, and a visible row
    /// the caller does not own is `Forbidden`.
    pub fn authorize_write(&self, project: ProjectId, what: &str) -> Result<()> {
        match self {
            Scope::All => Ok(()),
            Scope::Own(own) if *own == project => Ok(()),
            Scope::Own(_) => Err(Error::Forbidden(format!(
                "{what} belongs to another project"
            ))),
            Scope::Unassigned => Err(Error::Forbidden(
                "user is not assigned to any project".to_string(),
            )),
        }
    }

    /// SQL binding pair for `($1 OR project_id = $2)`.
    pub(crate) fn sql_filter(&self) -> (bool, Option<i64>) {
        match self {
            Scope::All => (true, None),
            Scope::Own(project) => (false, Some(project.0)),
            Scope::Unassigned => (false, None),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Own(project) => write!(f, "project:{project}"),
            Scope::All => f.write_str("all"),
            Scope::Unassigned => f.write_str("unassigned"),
        }
    }
}
