use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use onboard_core::{
    extract_emails, AcceptInvitationForm, GroupAction, MessageKey, Messages, PublicUser, User,
};

use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ApiError;
use crate::params::{IntParam, Params};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::service::{AcceptError, InviteError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkInviteRequest {
    #[serde(default)]
    pub group_id: Option<IntParam>,
    #[serde(default)]
    pub emails: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvitationPreview {
    pub email: String,
}

pub(crate) fn negotiate(headers: &HeaderMap) -> Messages {
    Messages::negotiate(
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok()),
    )
}

/// `POST /api/v1/invitations/bulk`
pub async fn bulk(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    Params(request): Params<BulkInviteRequest>,
) -> Result<StatusCode, ApiError> {
    let result = bulk_inner(&state, &user, &headers, request).await;
    let label = match &result {
        Ok(_) => "accepted",
        Err(ApiError::Params(_)) => "invalid",
        Err(ApiError::NotFound) => "not_found",
        Err(ApiError::Forbidden) => "forbidden",
        Err(_) => "error",
    };
    counter!("invitation_bulk_requests_total", "result" => label).increment(1);
    result
}

async fn bulk_inner(
    state: &AppState,
    user: &User,
    headers: &HeaderMap,
    request: BulkInviteRequest,
) -> Result<StatusCode, ApiError> {
    let messages = negotiate(headers);
    let group_id = match request.group_id {
        None => {
            return Err(ApiError::param(
                "group_id",
                messages.t(MessageKey::ParamMissing),
            ))
        }
        Some(param) => param.value().ok_or_else(|| {
            ApiError::param("group_id", messages.t(MessageKey::ParamInvalid))
        })?,
    };

    let group = state
        .storage()
        .groups()
        .find(group_id)
        .await
        .map_err(|err| internal("invite", "failed to load group", err))?
        .ok_or(ApiError::NotFound)?;

    let membership = state
        .storage()
        .memberships()
        .find(user.id, group.id)
        .await
        .map_err(|err| internal("invite", "failed to load membership", err))?;
    if let Err(denied) = state
        .policy()
        .authorize(membership.as_ref(), GroupAction::Invite)
    {
        info!(stage = "invite", user_id = user.id, group_id, reason = %denied, "bulk invite denied");
        return Err(ApiError::Forbidden);
    }

    let raw = request.emails.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(ApiError::param(
            "emails",
            messages.t(MessageKey::BulkEmailsEmpty),
        ));
    }

    let emails = extract_emails(&raw);
    if emails.is_empty() {
        return Err(ApiError::param(
            "emails",
            messages.t(MessageKey::BulkEmailsInvalid),
        ));
    }

    state
        .invitations()
        .bulk_invite(&group, user, &emails)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// `GET /invitations/:token`
pub async fn show(
    State(state): State<AppState>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(token): Path<String>,
) -> Result<Json<InvitationPreview>, ApiError> {
    let invitation = state
        .storage()
        .invitations()
        .find_by_token(&token)
        .await
        .map_err(|err| internal("show", "failed to load invitation", err))?
        .ok_or(ApiError::NotFound)?;

    if user.is_some() {
        return Err(ApiError::AuthConflict);
    }

    Ok(Json(InvitationPreview {
        email: invitation.email,
    }))
}

/// `POST /api/v1/invitations/accept/:token`
///
/// The token is resolved before the form is decoded, so an unknown token is
/// a 404 whatever the body holds.
pub async fn accept(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    params: Result<Params<AcceptInvitationForm>, ProblemResponse>,
) -> Result<Json<PublicUser>, ApiError> {
    let invitation = state
        .storage()
        .invitations()
        .find_by_token(&token)
        .await
        .map_err(|err| internal("accept", "failed to load invitation", err))?
        .ok_or(ApiError::NotFound)?;
    let Params(form) = params?;

    let user = state
        .invitations()
        .accept(&invitation, form, negotiate(&headers))
        .await?;

    Ok(Json(PublicUser::from(user)))
}

fn internal(stage: &'static str, message: &'static str, err: impl std::fmt::Display) -> ApiError {
    error!(stage, error = %err, "{message}");
    ProblemResponse::internal(message).into()
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::TokenExhausted => {
                error!(stage = "invite", error = %err, "token generation exhausted");
                ProblemResponse::new(StatusCode::CONFLICT, "token_conflict", err.to_string())
                    .into()
            }
            other => internal("invite", "failed to create invitations", other),
        }
    }
}

impl From<AcceptError> for ApiError {
    fn from(err: AcceptError) -> Self {
        match err {
            AcceptError::Invalid(errors) => ApiError::Validation(errors),
            AcceptError::AlreadyMember => {
                ProblemResponse::new(StatusCode::CONFLICT, "membership_conflict", err.to_string())
                    .into()
            }
            other => internal("accept", "failed to accept invitation", other),
        }
    }
}
