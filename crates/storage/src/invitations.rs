use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use onboard_core::Invitation;

use crate::{classify, to_rfc3339, Violation};

const INVITATION_COLUMNS: &str =
    "id, group_id, invited_by_id, email, token, sent_at, accepted, created_at, updated_at";

/// Repository responsible for the `invitations` table.
#[derive(Clone)]
pub struct InvitationRepository {
    pool: SqlitePool,
}

impl InvitationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a pending invitation.
    ///
    /// A token already present in the table yields [`InvitationError::DuplicateToken`]
    /// and leaves the transaction usable so the caller can retry with a new token.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        invitation: &NewInvitation<'_>,
    ) -> Result<Invitation, InvitationError> {
        let timestamp = to_rfc3339(invitation.created_at);
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "INSERT INTO invitations (group_id, invited_by_id, email, token, accepted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?) \
             RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(invitation.group_id)
        .bind(invitation.invited_by_id)
        .bind(invitation.email)
        .bind(invitation.token)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| match classify(&err) {
            Some(Violation::Unique(message)) if message.contains("invitations.token") => {
                InvitationError::DuplicateToken
            }
            Some(Violation::ForeignKey) => InvitationError::MissingReference,
            _ => InvitationError::Database(err),
        })?;

        Ok(row.into())
    }

    /// Looks an invitation up by its exact token.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<Invitation>, InvitationError> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Invitation::from))
    }

    /// Lists every invitation of a group, newest first.
    pub async fn list_for_group(&self, group_id: i64) -> Result<Vec<Invitation>, InvitationError> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE group_id = ? \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Invitation::from).collect())
    }

    /// Flips a pending invitation to accepted.
    ///
    /// Returns [`InvitationError::AlreadyAccepted`] when the row was accepted
    /// concurrently, so exactly one acceptance wins.
    pub async fn mark_accepted(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        invitation_id: i64,
        accepted_at: DateTime<Utc>,
    ) -> Result<(), InvitationError> {
        let result = sqlx::query(
            "UPDATE invitations SET accepted = 1, updated_at = ? WHERE id = ? AND accepted = 0",
        )
        .bind(to_rfc3339(accepted_at))
        .bind(invitation_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(InvitationError::AlreadyAccepted);
        }
        Ok(())
    }

    /// Pending invitations whose email has not been delivered yet, oldest first.
    pub async fn list_undelivered(&self, limit: i64) -> Result<Vec<Invitation>, InvitationError> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             WHERE sent_at IS NULL AND accepted = 0 \
             ORDER BY created_at ASC, id ASC \
             LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Invitation::from).collect())
    }

    /// Records the delivery time of an invitation email.
    pub async fn mark_sent(
        &self,
        invitation_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), InvitationError> {
        let timestamp = to_rfc3339(sent_at);
        sqlx::query("UPDATE invitations SET sent_at = ?, updated_at = ? WHERE id = ?")
            .bind(&timestamp)
            .bind(&timestamp)
            .bind(invitation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Data required to create an invitation.
pub struct NewInvitation<'a> {
    pub group_id: i64,
    pub invited_by_id: i64,
    pub email: &'a str,
    pub token: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    id: i64,
    group_id: i64,
    invited_by_id: i64,
    email: String,
    token: String,
    sent_at: Option<DateTime<Utc>>,
    accepted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InvitationRow> for Invitation {
    fn from(row: InvitationRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            invited_by_id: row.invited_by_id,
            email: row.email,
            token: row.token,
            sent_at: row.sent_at,
            accepted: row.accepted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Errors that can occur while reading or writing invitations.
#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("invitation token already exists")]
    DuplicateToken,
    #[error("invitation has already been accepted")]
    AlreadyAccepted,
    #[error("group or inviting user does not exist")]
    MissingReference,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
