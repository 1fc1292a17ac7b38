use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use onboard_core::{Group, GroupAction, Invitation, InvitationStatus, MessageKey, Role};
use onboard_storage::{Database, GroupError, MembershipError, NewMembership};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::invitations::negotiate;
use crate::params::Params;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Invitation as shown to group admins. The token is never exposed.
#[derive(Debug, Serialize)]
pub struct InvitationSummary {
    pub id: i64,
    pub email: String,
    pub status: InvitationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationSummary {
    fn from(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            status: invitation.status(),
            email: invitation.email,
            sent_at: invitation.sent_at,
            created_at: invitation.created_at,
        }
    }
}

/// `POST /api/v1/groups`
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    Params(request): Params<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let name = request
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ApiError::param("name", negotiate(&headers).t(MessageKey::GroupNameBlank))
        })?;

    let group = insert_group(state.storage(), &name, user.id, state.now())
        .await
        .map_err(|err| {
            error!(stage = "groups", user_id = user.id, error = %err, "failed to create group");
            ProblemResponse::internal("failed to create group")
        })?;

    info!(stage = "groups", group_id = group.id, admin_id = user.id, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

async fn insert_group(
    database: &Database,
    name: &str,
    admin_id: i64,
    now: DateTime<Utc>,
) -> Result<Group, CreateGroupError> {
    let mut tx = database.begin().await?;
    let group = database.groups().insert(&mut tx, name, now).await?;
    database
        .memberships()
        .insert(
            &mut tx,
            &NewMembership {
                user_id: admin_id,
                group_id: group.id,
                role: Role::Admin,
                created_at: now,
            },
        )
        .await?;
    tx.commit().await?;
    Ok(group)
}

#[derive(Debug, Error)]
enum CreateGroupError {
    #[error("group error: {0}")]
    Group(#[from] GroupError),
    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `GET /api/v1/groups/:id/invitations`
pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<InvitationSummary>>, ApiError> {
    let storage = state.storage();
    let group = storage
        .groups()
        .find(group_id)
        .await
        .map_err(|err| {
            error!(stage = "groups", group_id, error = %err, "failed to load group");
            ProblemResponse::internal("failed to load group")
        })?
        .ok_or(ApiError::NotFound)?;

    let membership = storage
        .memberships()
        .find(user.id, group.id)
        .await
        .map_err(|err| {
            error!(stage = "groups", group_id, error = %err, "failed to load membership");
            ProblemResponse::internal("failed to load membership")
        })?;
    state
        .policy()
        .authorize(membership.as_ref(), GroupAction::ListInvitations)
        .map_err(|_| ApiError::Forbidden)?;

    let invitations = storage
        .invitations()
        .list_for_group(group.id)
        .await
        .map_err(|err| {
            error!(stage = "groups", group_id, error = %err, "failed to list invitations");
            ProblemResponse::internal("failed to list invitations")
        })?;

    Ok(Json(
        invitations.into_iter().map(InvitationSummary::from).collect(),
    ))
}
