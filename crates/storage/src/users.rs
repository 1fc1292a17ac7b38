use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use onboard_core::User;

use crate::{classify, to_rfc3339, Violation};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, username, password_digest, created_at, updated_at";

/// Repository responsible for the `users` table.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new account. Unique index violations map to dedicated variants.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user: &NewUser<'_>,
    ) -> Result<User, UserError> {
        let timestamp = to_rfc3339(user.created_at);
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, first_name, last_name, username, password_digest, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.username)
        .bind(user.password_digest)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| match classify(&err) {
            Some(Violation::Unique(message)) if message.contains("users.username") => {
                UserError::UsernameTaken
            }
            Some(Violation::Unique(message)) if message.contains("users.email") => {
                UserError::EmailTaken
            }
            _ => UserError::Database(err),
        })?;

        Ok(row.into())
    }

    pub async fn find(&self, id: i64) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, UserError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, UserError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// Data required to create a user.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub username: &'a str,
    pub password_digest: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    username: String,
    password_digest: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            username: row.username,
            password_digest: row.password_digest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Errors that can occur while reading or writing users.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already registered")]
    EmailTaken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
