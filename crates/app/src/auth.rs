use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use onboard_core::User;

use crate::error::ApiError;
use crate::problem::ProblemResponse;
use crate::router::AppState;

const SESSION_AUDIENCE: &str = "session";

/// Issues and verifies HS256 session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Signs a session for `user_id` valid from `now` for the configured TTL.
    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> Result<IssuedSession, TokenError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|err| TokenError::Encode(err.to_string()))?;
        let expires_at = now + ttl;
        let claims = SessionClaims {
            sub: user_id.to_string(),
            aud: SESSION_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Encode(err.to_string()))?;
        Ok(IssuedSession { token, expires_at })
    }

    /// Verifies the signature and claims, returning the user id.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<i64, TokenError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(format!("{err}")))?
            .claims;

        if claims.aud != SESSION_AUDIENCE {
            return Err(TokenError::Invalid("audience_mismatch".to_string()));
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Invalid("token_expired".to_string()));
        }
        claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::Invalid("subject_malformed".to_string()))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionClaims {
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Encode(String),
}

/// The user behind a verified session, attached by [`require_user`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Session state attached by [`optional_user`]; `None` for anonymous callers.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Middleware rejecting requests without a valid session.
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = match authenticate(&state, request.headers()).await? {
        Authentication::User(user) => user,
        Authentication::Anonymous | Authentication::Invalid => {
            return Err(ApiError::Unauthenticated)
        }
    };
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Middleware resolving the session when present. Invalid sessions count as anonymous.
pub async fn optional_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = match authenticate(&state, request.headers()).await? {
        Authentication::User(user) => Some(user),
        Authentication::Anonymous | Authentication::Invalid => None,
    };
    request.extensions_mut().insert(MaybeUser(user));
    Ok(next.run(request).await)
}

enum Authentication {
    Anonymous,
    Invalid,
    User(User),
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Authentication, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Authentication::Anonymous);
    };
    let Some(token) = value
        .to_str()
        .ok()
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim)
    else {
        return Ok(Authentication::Invalid);
    };

    let user_id = match state.sessions().verify(token, state.now()) {
        Ok(user_id) => user_id,
        Err(err) => {
            debug!(stage = "auth", error = %err, "rejected session token");
            return Ok(Authentication::Invalid);
        }
    };

    let user = state.storage().users().find(user_id).await.map_err(|err| {
        error!(stage = "auth", user_id, error = %err, "failed to load session user");
        ProblemResponse::internal("failed to load session user")
    })?;

    Ok(user.map_or(Authentication::Invalid, Authentication::User))
}

/// Hashes a password with Argon2id on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| PasswordError::Hash(err.to_string()))
    })
    .await
    .map_err(|err| PasswordError::Hash(err.to_string()))?
}

/// Verifies a password against a stored Argon2 digest on the blocking pool.
pub async fn verify_password(password: String, digest: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&digest)
            .map_err(|err| PasswordError::Digest(err.to_string()))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordError::Hash(err.to_string())),
        }
    })
    .await
    .map_err(|err| PasswordError::Hash(err.to_string()))?
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password digest is malformed: {0}")]
    Digest(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn tokens() -> SessionTokens {
        SessionTokens::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(3600))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let tokens = tokens();
        let session = tokens.issue(42, now()).expect("issue");
        assert_eq!(session.expires_at, now() + ChronoDuration::hours(1));

        assert_eq!(tokens.verify(&session.token, now()).expect("valid"), 42);
        let err = tokens
            .verify(&session.token, now() + ChronoDuration::hours(1))
            .expect_err("expired");
        assert!(matches!(err, TokenError::Invalid(reason) if reason == "token_expired"));
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let other = SessionTokens::new(b"another-secret-another-secret-!!", Duration::from_secs(60));
        let session = other.issue(42, now()).expect("issue");
        assert!(tokens().verify(&session.token, now()).is_err());
    }

    #[tokio::test]
    async fn password_round_trip() {
        let digest = hash_password("correct horse".into()).await.expect("hash");
        assert!(digest.starts_with("$argon2"));
        assert!(verify_password("correct horse".into(), digest.clone())
            .await
            .expect("verify"));
        assert!(!verify_password("wrong".into(), digest).await.expect("verify"));
    }

    #[tokio::test]
    async fn malformed_digest_is_an_error() {
        let err = verify_password("x".into(), "not-a-digest".into())
            .await
            .expect_err("malformed");
        assert!(matches!(err, PasswordError::Digest(_)));
    }
}
