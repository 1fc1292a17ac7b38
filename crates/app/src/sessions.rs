use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use onboard_core::PublicUser;

use crate::auth::verify_password;
use crate::error::ApiError;
use crate::params::Params;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: PublicUser,
}

/// `POST /api/v1/sessions`
pub async fn create(
    State(state): State<AppState>,
    Params(request): Params<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = state
        .storage()
        .users()
        .find_by_username(request.username.trim())
        .await
        .map_err(|err| {
            error!(stage = "auth", error = %err, "failed to load user");
            ProblemResponse::internal("failed to load user")
        })?;

    let authenticated = match user {
        Some(user) => {
            let matches = verify_password(request.password, user.password_digest.clone())
                .await
                .map_err(|err| {
                    error!(stage = "auth", user_id = user.id, error = %err, "password check failed");
                    ProblemResponse::internal("password check failed")
                })?;
            matches.then_some(user)
        }
        None => None,
    };

    let Some(user) = authenticated else {
        counter!("session_logins_total", "result" => "rejected").increment(1);
        return Err(ProblemResponse::new(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "username or password is incorrect",
        )
        .into());
    };

    let session = state.sessions().issue(user.id, state.now()).map_err(|err| {
        error!(stage = "auth", user_id = user.id, error = %err, "failed to issue session");
        ProblemResponse::internal("failed to issue session")
    })?;

    counter!("session_logins_total", "result" => "ok").increment(1);
    info!(stage = "auth", user_id = user.id, "session issued");
    Ok(Json(SessionResponse {
        token: session.token,
        expires_at: session.expires_at,
        user: user.into(),
    }))
}
