use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use onboard_core::GroupPolicy;
use onboard_storage::Database;

use crate::auth::{self, SessionTokens};
use crate::problem::ProblemResponse;
use crate::service::InvitationService;
use crate::{groups, invitations, sessions, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    sessions: SessionTokens,
    invitations: InvitationService,
    policy: GroupPolicy,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, sessions: SessionTokens) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        let invitations = InvitationService::new(storage.clone(), clock.clone());
        Self {
            metrics,
            storage,
            sessions,
            invitations,
            policy: GroupPolicy::new(),
            clock,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock.clone();
        self.invitations = InvitationService::new(self.storage.clone(), clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn sessions(&self) -> &SessionTokens {
        &self.sessions
    }

    pub fn invitations(&self) -> &InvitationService {
        &self.invitations
    }

    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/groups", post(groups::create))
        .route(
            "/api/v1/groups/:id/invitations",
            get(groups::list_invitations),
        )
        .route("/api/v1/invitations/bulk", post(invitations::bulk))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    let session_aware = Router::new()
        .route("/invitations/:token", get(invitations::show))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::optional_user,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/v1/sessions", post(sessions::create))
        .route(
            "/api/v1/invitations/accept/:token",
            post(invitations::accept),
        )
        .merge(authenticated)
        .merge(session_aware)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ProblemResponse> {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map(IntoResponse::into_response)
        .map_err(|err| ProblemResponse::internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    use crate::test_support::{send, TestContext};

    #[tokio::test]
    async fn healthz_returns_ok() {
        let ctx = TestContext::new().await;
        let (status, _) = send(
            ctx.router(),
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let ctx = TestContext::new().await;
        let (status, body) = send(
            ctx.router(),
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let ctx = TestContext::new().await;
        for (method, uri) in [
            ("POST", "/api/v1/groups"),
            ("GET", "/api/v1/groups/1/invitations"),
            ("POST", "/api/v1/invitations/bulk"),
        ] {
            let (status, body) = send(
                ctx.router(),
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::AUTHORIZATION, "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert!(body.is_empty());
        }
    }
}
