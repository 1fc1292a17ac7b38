use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use onboard_core::Group;

use crate::to_rfc3339;

/// Repository responsible for the `groups` table.
#[derive(Clone)]
pub struct GroupRepository {
    pool: SqlitePool,
}

impl GroupRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a group and returns the stored row.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Group, GroupError> {
        let timestamp = to_rfc3339(created_at);
        let row = sqlx::query_as::<_, GroupRow>(
            "INSERT INTO groups (name, created_at, updated_at) VALUES (?, ?, ?) \
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into())
    }

    /// Loads a group by primary key.
    pub async fn find(&self, id: i64) -> Result<Option<Group>, GroupError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, created_at, updated_at FROM groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Group::from))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Errors that can occur while reading or writing groups.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
