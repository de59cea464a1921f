//! Accounts, passwords and bearer tokens.
//!
//! Passwords are argon2 hashes. Bearer tokens are random `wb_` strings
//! handed out once at login; only their SHA-256 digest is stored.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::project::ProjectId;
use crate::model::user::*;
use crate::model::{Page, PageRequest};
use crate::scope::Scope;

pub const TOKEN_PREFIX: &str = "wb_";

const SELECT_USER: &str = "SELECT u.id, u.username, u.fio_name, u.email, u.role, u.is_superuser,
        u.is_active, u.first_login, u.project_id, p.project_name, u.date_joined, u.last_login
     FROM users u
     LEFT JOIN projects p ON p.id = u.project_id";

pub fn hash_password(password: &str) -> Result<String> {
    if password.trim().is_empty() {
        return Err(Error::Validation("password is empty".to_string()));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Other(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(value) => value,
        Err(err) => {
            warn!("password hash parse failed: {err}");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// A fresh opaque bearer token.
pub fn generate_token() -> String {
    format!(
        "{TOKEN_PREFIX}{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// A temporary password for operator-created accounts.
pub fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Hex SHA-256 digest under which a token is stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl super::Db {
    pub async fn create_user(&self, new: NewUser, password: &str) -> Result<User> {
        if new.username.trim().is_empty() {
            return Err(Error::Validation("username is required".to_string()));
        }
        if new.role == Role::Standard && new.project.is_none() && !new.is_superuser {
            warn!(username = %new.username, "standard user created without a project");
        }
        let password_hash = hash_password(password)?;

        let (id,): (UserId,) = sqlx::query_as(
            "INSERT INTO users (username, email, fio_name, role, is_superuser, project_id,
                                first_login, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.fio_name)
        .bind(new.role.as_str())
        .bind(new.is_superuser)
        .bind(new.project)
        .bind(new.first_login)
        .bind(&password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Validation(format!(
                "username or email already taken: {}",
                new.username
            )),
            other => Error::Database(other),
        })?;

        info!(user = id.0, username = %new.username, role = %new.role, "user created");
        self.get_user(id).await
    }

    pub async fn get_user(&self, id: UserId) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| Error::NotFound(format!("user {id}")))?
            .try_into_user()
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE u.username = $1"))
                .bind(username)
                .fetch_optional(self.pool())
                .await?;
        row.ok_or_else(|| Error::NotFound(format!("user {username}")))?
            .try_into_user()
    }

    /// Accounts visible in `scope`: cross-project callers see everyone,
    /// others see members of their own project.
    pub async fn list_users(&self, scope: &Scope, page: PageRequest) -> Result<Page<User>> {
        let (all, project) = scope.sql_filter();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users u WHERE ($1 OR u.project_id = $2)")
                .bind(all)
                .bind(project)
                .fetch_one(self.pool())
                .await?;

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "{SELECT_USER} WHERE ($1 OR u.project_id = $2) ORDER BY u.id LIMIT $3 OFFSET $4"
        ))
        .bind(all)
        .bind(project)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        let results = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(page, count, results))
    }

    /// Check credentials and issue a bearer token valid for `ttl`.
    ///
    /// Unknown users, wrong passwords and disabled accounts all produce the
    /// same `Unauthorized` error.
    pub async fn login(&self, credentials: &Credentials, ttl: chrono::Duration) -> Result<(String, User)> {
        let invalid = || Error::Unauthorized("invalid username or password".to_string());

        let row: Option<(UserId, String, bool)> = sqlx::query_as(
            "SELECT id, password_hash, is_active FROM users WHERE username = $1",
        )
        .bind(&credentials.username)
        .fetch_optional(self.pool())
        .await?;
        let Some((id, password_hash, is_active)) = row else {
            return Err(invalid());
        };
        if !is_active || !verify_password(&password_hash, &credentials.password) {
            return Err(invalid());
        }

        let token = generate_token();
        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO api_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(hash_token(&token))
            .bind(id)
            .bind(Utc::now() + ttl)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(user = id.0, "login");
        Ok((token, self.get_user(id).await?))
    }

    /// Resolve a bearer token to its active, unexpired account.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let unauthorized = || Error::Unauthorized("invalid or expired token".to_string());
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(unauthorized());
        }

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "{SELECT_USER}
             JOIN api_tokens t ON t.user_id = u.id
             WHERE t.token_hash = $1 AND t.expires_at > now() AND u.is_active"
        ))
        .bind(hash_token(token))
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(unauthorized)?.try_into_user()
    }

    /// Drop expired tokens. Returns how many were removed.
    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM api_tokens WHERE expires_at <= now()")
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(removed)
    }

    /// Self-service password change. Clears `first_login`.
    pub async fn change_password(&self, id: UserId, change: &PasswordChange) -> Result<()> {
        let (password_hash,): (String,) =
            sqlx::query_as("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?
                .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        if !verify_password(&password_hash, &change.old_password) {
            return Err(Error::Validation("old password is incorrect".to_string()));
        }
        change.validate()?;

        sqlx::query("UPDATE users SET password_hash = $1, first_login = FALSE WHERE id = $2")
            .bind(hash_password(&change.new_password)?)
            .bind(id)
            .execute(self.pool())
            .await?;
        info!(user = id.0, "password changed");
        Ok(())
    }

    /// Operator reset. Sets `first_login` so the user is prompted to change
    /// it, and revokes every outstanding token.
    pub async fn reset_password(&self, username: &str, password: &str) -> Result<User> {
        let user = self.get_user_by_username(username).await?;
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE users SET password_hash = $1, first_login = TRUE WHERE id = $2")
            .bind(hash_password(password)?)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM api_tokens WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(user = user.id.0, "password reset");
        self.get_user(user.id).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    fio_name: String,
    email: String,
    role: String,
    is_superuser: bool,
    is_active: bool,
    first_login: bool,
    project_id: Option<ProjectId>,
    project_name: Option<String>,
    date_joined: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            fio_name: self.fio_name,
            email: self.email,
            role: self.role.parse()?,
            is_superuser: self.is_superuser,
            is_active: self.is_active,
            first_login: self.first_login,
            project: self.project_id,
            project_name: self.project_name,
            date_joined: self.date_joined,
            last_login: self.last_login,
        })
    }
}
