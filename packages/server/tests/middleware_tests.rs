//! Authentication gate over the real middleware stack.
//!
//! Drives a router through `tower::ServiceExt::oneshot` with the same
//! layers `build_app` installs, so the middleware futures must satisfy
//! axum's `Send` bounds to compile at all.

mod common;

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use common::{device, harness, TestHarness};
use server_core::common::AppError;
use server_core::kernel::test_deps::{test_user, MockEmailSender, MockSmsSender};
use server_core::kernel::ServerDeps;
use server_core::server::middleware::{
    capture_device_context, jwt_auth_middleware, require_auth, AuthUser,
};

async fn me_handler(
    auth: Option<Extension<AuthUser>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let auth = require_auth(auth.as_deref())?;
    Ok(Json(serde_json::json!({ "userId": auth.user_id })))
}

/// Router with the production middleware stack over in-memory stores.
fn gated_router(h: &TestHarness, session_validation_enabled: bool) -> Router {
    // Never connected; the gate only touches the trait-object stores.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unreachable")
        .unwrap();

    let deps = Arc::new(ServerDeps::new(
        pool,
        h.stores.users.clone(),
        h.stores.otps.clone(),
        h.stores.sessions.clone(),
        h.stores.queue.clone(),
        Arc::new(server_core::kernel::test_deps::MockHasher),
        Arc::new(MockSmsSender::new()),
        Arc::new(MockEmailSender::new()),
        None,
        h.jwt.clone(),
        session_validation_enabled,
    ));
    let session_service = h.session_service.clone();

    Router::new()
        .route("/me", get(me_handler))
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(deps.clone(), session_service.clone(), req, next)
        }))
        .layer(middleware::from_fn(capture_device_context))
}

fn get_me(token: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder().uri("/me");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(axum::body::Body::empty()).unwrap()
}

#[tokio::test]
async fn test_request_without_token_is_rejected() {
    let h = harness();
    let app = gated_router(&h, true);

    let response = app.oneshot(get_me(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_with_live_session_passes() {
    let h = harness();

    let user = test_user("phone");
    h.stores.users.seed(user.clone());
    let session = h
        .session_service
        .create_session(user.id, &device(), None)
        .await
        .unwrap();
    let token = h
        .jwt
        .create_access_token(user.id, None, user.phone.clone(), session.session_id)
        .unwrap();

    let app = gated_router(&h, true);
    let response = app.oneshot(get_me(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_for_revoked_session_is_rejected() {
    let h = harness();

    let user = test_user("phone");
    h.stores.users.seed(user.clone());
    let session = h
        .session_service
        .create_session(user.id, &device(), None)
        .await
        .unwrap();
    let token = h
        .jwt
        .create_access_token(user.id, None, user.phone.clone(), session.session_id)
        .unwrap();
    h.session_service
        .revoke_by_id(session.session_id)
        .await
        .unwrap();

    let app = gated_router(&h, true);
    let response = app.oneshot(get_me(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_disabled_session_validation_accepts_dead_session_token() {
    let h = harness();

    let user = test_user("phone");
    h.stores.users.seed(user.clone());
    let session = h
        .session_service
        .create_session(user.id, &device(), None)
        .await
        .unwrap();
    let token = h
        .jwt
        .create_access_token(user.id, None, user.phone.clone(), session.session_id)
        .unwrap();
    h.session_service
        .revoke_by_id(session.session_id)
        .await
        .unwrap();

    // With the liveness check off, the signature alone is enough
    let app = gated_router(&h, false);
    let response = app.oneshot(get_me(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let h = harness();
    let app = gated_router(&h, true);

    let response = app.oneshot(get_me(Some("not-a-jwt"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
