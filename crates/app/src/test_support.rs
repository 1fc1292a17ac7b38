use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use onboard_core::{Group, Invitation, Role, User};
use onboard_storage::{Database, NewInvitation, NewMembership, NewUser};

use crate::auth::{hash_password, SessionTokens};
use crate::router::{app_router, AppState};
use crate::service::InvitationService;
use crate::telemetry;

pub const SESSION_SECRET: &[u8] = b"test-session-secret-test-session";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn fixed_clock() -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
    Arc::new(now)
}

/// A migrated database holding one group administered by `admin`.
pub struct TestContext {
    database: Database,
    pub admin: User,
    pub group: Group,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let admin = insert_user(&database, "admin", "admin@example.com", ADMIN_PASSWORD).await;
        let mut tx = database.begin().await.expect("begin");
        let group = database
            .groups()
            .insert(&mut tx, "Food co-op", now())
            .await
            .expect("group");
        tx.commit().await.expect("commit");

        let ctx = Self {
            database,
            admin,
            group,
            _dir: dir,
        };
        ctx.join(&ctx.admin, Role::Admin).await;
        ctx
    }

    pub fn db(&self) -> &Database {
        &self.database
    }

    pub fn service(&self) -> InvitationService {
        InvitationService::new(self.database.clone(), fixed_clock())
    }

    pub fn state(&self) -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        AppState::new(
            metrics,
            self.database.clone(),
            SessionTokens::new(SESSION_SECRET, Duration::from_secs(3600)),
        )
        .with_clock(fixed_clock())
    }

    pub fn router(&self) -> Router {
        app_router(self.state())
    }

    /// Bearer header value for a fresh session of `user`.
    pub fn bearer(&self, user: &User) -> String {
        let session = SessionTokens::new(SESSION_SECRET, Duration::from_secs(3600))
            .issue(user.id, now())
            .expect("issue session");
        format!("Bearer {}", session.token)
    }

    pub async fn user(&self, username: &str) -> User {
        insert_user(
            &self.database,
            username,
            &format!("{username}@example.com"),
            "irrelevant-password",
        )
        .await
    }

    pub async fn join(&self, user: &User, role: Role) {
        let mut tx = self.database.begin().await.expect("begin");
        self.database
            .memberships()
            .insert(
                &mut tx,
                &NewMembership {
                    user_id: user.id,
                    group_id: self.group.id,
                    role,
                    created_at: now(),
                },
            )
            .await
            .expect("membership");
        tx.commit().await.expect("commit");
    }

    pub async fn invite(&self, email: &str, token: &str) -> Invitation {
        let mut tx = self.database.begin().await.expect("begin");
        let invitation = self
            .database
            .invitations()
            .insert(
                &mut tx,
                &NewInvitation {
                    group_id: self.group.id,
                    invited_by_id: self.admin.id,
                    email,
                    token,
                    created_at: now(),
                },
            )
            .await
            .expect("invitation");
        tx.commit().await.expect("commit");
        invitation
    }

    pub async fn invitation_count(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invitations")
            .fetch_one(self.database.pool())
            .await
            .expect("count");
        count
    }

    pub async fn user_count(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.database.pool())
            .await
            .expect("count");
        count
    }
}

async fn insert_user(database: &Database, username: &str, email: &str, password: &str) -> User {
    let digest = hash_password(password.to_string()).await.expect("hash");
    let mut tx = database.begin().await.expect("begin");
    let user = database
        .users()
        .insert(
            &mut tx,
            &NewUser {
                email,
                first_name: "Test",
                last_name: "User",
                username,
                password_digest: &digest,
                created_at: now(),
            },
        )
        .await
        .expect("user");
    tx.commit().await.expect("commit");
    user
}

/// Sends a request through the router, returning the status and raw body.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.oneshot(request).await.expect("handler should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should read")
        .to_bytes();
    (status, body.to_vec())
}

pub fn json_request(method: &str, uri: &str, bearer: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = bearer {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn json_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("json body")
}
