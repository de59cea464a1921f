//! User accounts and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::ProjectId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an account. Admin and service accounts see every project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Standard,
    Admin,
    Service,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Admin => "admin",
            Role::Service => "service",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Role::Standard),
            "admin" => Ok(Role::Admin),
            "service" => Ok(Role::Service),
            other => Err(crate::error::Error::Validation(format!(
                "unknown role: {other}"
            ))),
        }
    }
}

/// An account as seen by the API. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub fio_name: String,
    pub email: String,
    pub role: Role,
    pub is_superuser: bool,
    pub is_active: bool,
    /// Set while the account still holds a system-issued password.
    pub first_login: bool,
    pub project: Option<ProjectId>,
    pub project_name: Option<String>,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Admin, service and superuser accounts are not bound to one project.
    pub fn has_cross_project_access(&self) -> bool {
        self.is_superuser || matches!(self.role, Role::Admin | Role::Service)
    }
}

/// Operator-side account creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fio_name: String,
    pub role: Role,
    pub is_superuser: bool,
    pub project: Option<ProjectId>,
    pub first_login: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub const MIN_PASSWORD_LEN: usize = 8;

impl PasswordChange {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.new_password != self.confirm_password {
            return Err(crate::error::Error::Validation(
                "new passwords do not match".to_string(),
            ));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(crate::error::Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        Ok(())
    }
}
