mod groups;
mod invitations;
mod memberships;
pub mod schema;
mod users;

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

pub use groups::{GroupError, GroupRepository};
pub use invitations::{InvitationError, InvitationRepository, NewInvitation};
pub use memberships::{MembershipError, MembershipRepository, NewMembership};
pub use schema::SchemaError;
pub use users::{NewUser, UserError, UserRepository};

/// SQLite extended result code for a violated UNIQUE index.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
/// SQLite extended result code for a violated foreign key.
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Checks the live database against the declarative table definitions.
    pub async fn verify_schema(&self) -> Result<(), StorageError> {
        schema::verify(&self.pool).await?;
        Ok(())
    }

    /// Begins a transaction spanning several repositories.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Returns a handle for interacting with groups.
    pub fn groups(&self) -> GroupRepository {
        GroupRepository::new(self.pool.clone())
    }

    /// Returns a handle for interacting with invitations.
    pub fn invitations(&self) -> InvitationRepository {
        InvitationRepository::new(self.pool.clone())
    }

    /// Returns a handle for interacting with group memberships.
    pub fn memberships(&self) -> MembershipRepository {
        MembershipRepository::new(self.pool.clone())
    }

    /// Returns a handle for interacting with user accounts.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Classification of constraint violations reported by SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violation {
    /// A UNIQUE index rejected the row; carries SQLite's message
    /// (`UNIQUE constraint failed: table.column`).
    Unique(String),
    ForeignKey,
}

pub(crate) fn classify(err: &sqlx::Error) -> Option<Violation> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    match db_err.code() {
        Some(code) if code == Cow::Borrowed(SQLITE_CONSTRAINT_UNIQUE) => {
            Some(Violation::Unique(db_err.message().to_string()))
        }
        Some(code) if code == Cow::Borrowed(SQLITE_CONSTRAINT_FOREIGNKEY) => {
            Some(Violation::ForeignKey)
        }
        _ => None,
    }
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn migrations_apply_and_match_schema() {
        let test = setup_db().await;
        test.db.verify_schema().await.expect("schema matches");

        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite%'",
        )
        .fetch_one(test.db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0 as usize, schema::TABLES.len());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let test = setup_db().await;
        test.db.run_migrations().await.expect("second run");
    }

    #[test]
    fn formats_timestamps_with_millis() {
        assert_eq!(to_rfc3339(now()), "2024-01-01T00:00:00.000Z");
    }
}
