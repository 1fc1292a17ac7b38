use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use onboard_core::FieldErrors;

use crate::problem::ProblemResponse;

/// Failure outcomes of API handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    /// No valid session was presented. 401, empty body.
    Unauthenticated,
    /// The session holder may not act on the resource. 403, empty body.
    Forbidden,
    /// Unknown group or token. 404, empty body.
    NotFound,
    /// An authenticated caller hit an anonymous-only endpoint. 400, empty body.
    AuthConflict,
    /// Missing or unusable parameters. 400 `{errors: {field: message}}`.
    Params(BTreeMap<&'static str, String>),
    /// Record validation failures. 400 `{field: [message]}`.
    Validation(FieldErrors),
    Problem(ProblemResponse),
}

impl ApiError {
    pub fn param(field: &'static str, message: impl Into<String>) -> Self {
        Self::Params(BTreeMap::from([(field, message.into())]))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AuthConflict | Self::Params(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Problem(problem) => problem.status(),
        }
    }
}

impl From<ProblemResponse> for ApiError {
    fn from(value: ProblemResponse) -> Self {
        Self::Problem(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Unauthenticated | Self::Forbidden | Self::NotFound | Self::AuthConflict => {
                status.into_response()
            }
            Self::Params(errors) => (status, Json(json!({ "errors": errors }))).into_response(),
            Self::Validation(errors) => (status, Json(errors)).into_response(),
            Self::Problem(problem) => problem.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(error: ApiError) -> (StatusCode, Vec<u8>) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn simple_denials_have_empty_bodies() {
        for (error, status) in [
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (ApiError::NotFound, StatusCode::NOT_FOUND),
            (ApiError::AuthConflict, StatusCode::BAD_REQUEST),
        ] {
            let (actual, body) = body_of(error).await;
            assert_eq!(actual, status);
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn params_are_wrapped_in_errors_object() {
        let (status, body) = body_of(ApiError::param("emails", "is missing")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value, json!({ "errors": { "emails": "is missing" } }));
    }

    #[tokio::test]
    async fn validation_errors_are_keyed_by_field() {
        let errors = FieldErrors::single("password_confirmation", "doesn't match Password");
        let (status, body) = body_of(ApiError::Validation(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(
            value,
            json!({ "password_confirmation": ["doesn't match Password"] })
        );
    }
}
