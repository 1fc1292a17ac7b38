use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use onboard_core::{Membership, Role};

use crate::{classify, to_rfc3339, Violation};

/// Repository responsible for the `memberships` table.
#[derive(Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Adds a user to a group. The `(user_id, group_id)` pair is unique.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        membership: &NewMembership,
    ) -> Result<Membership, MembershipError> {
        let timestamp = to_rfc3339(membership.created_at);
        let row = sqlx::query_as::<_, MembershipRow>(
            "INSERT INTO memberships (user_id, group_id, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id, user_id, group_id, role, created_at, updated_at",
        )
        .bind(membership.user_id)
        .bind(membership.group_id)
        .bind(membership.role.as_i64())
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| match classify(&err) {
            Some(Violation::Unique(_)) => MembershipError::AlreadyMember,
            Some(Violation::ForeignKey) => MembershipError::MissingReference,
            None => MembershipError::Database(err),
        })?;

        row.try_into()
    }

    /// Loads the membership of `user_id` in `group_id`, if any.
    pub async fn find(
        &self,
        user_id: i64,
        group_id: i64,
    ) -> Result<Option<Membership>, MembershipError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT id, user_id, group_id, role, created_at, updated_at \
             FROM memberships WHERE user_id = ? AND group_id = ?",
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Membership::try_from).transpose()
    }
}

/// Data required to create a membership.
pub struct NewMembership {
    pub user_id: i64,
    pub group_id: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: i64,
    user_id: i64,
    group_id: i64,
    role: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = MembershipError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = Role::from_i64(row.role).ok_or(MembershipError::UnknownRole(row.role))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            group_id: row.group_id,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Errors that can occur while reading or writing memberships.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("user is already a member of the group")]
    AlreadyMember,
    #[error("user or group does not exist")]
    MissingReference,
    #[error("unknown membership role {0}")]
    UnknownRole(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
