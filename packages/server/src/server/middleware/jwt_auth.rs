//! Request authentication gate.
//!
//! Extracts a bearer token, verifies signature and expiry, then resolves
//! the full user and (when enabled) checks the session named by `jti` is
//! still alive. On success an `AuthUser` lands in request extensions;
//! otherwise the request continues unauthenticated and protected handlers
//! reject it.

use std::sync::Arc;

use axum::{http::HeaderMap, middleware::Next, response::Response};
use tracing::debug;
use uuid::Uuid;

use crate::common::AppError;
use crate::domains::sessions::SessionService;
use crate::domains::users::User;
use crate::kernel::ServerDeps;

/// Authenticated user information from a verified access token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub user: User,
}

/// JWT authentication middleware.
///
/// Requests without a valid token pass through without an `AuthUser`
/// (public access); protected handlers call [`require_auth`].
pub async fn jwt_auth_middleware(
    deps: Arc<ServerDeps>,
    session_service: Arc<SessionService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    // Taking the token by value here keeps the request (whose body is not
    // Sync) out of the authentication future.
    let token = bearer_token(request.headers());

    if let Some(token) = token {
        if let Some(user) = authenticate(&deps, &session_service, &token).await {
            debug!(user_id = %user.user_id, "authenticated request");
            request.extensions_mut().insert(user);
        }
    }

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("authorization")?.to_str().ok()?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).to_string())
}

async fn authenticate(
    deps: &ServerDeps,
    session_service: &SessionService,
    token: &str,
) -> Option<AuthUser> {
    let claims = deps.jwt_service.verify_access_token(token).ok()?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;
    let session_id = Uuid::parse_str(&claims.jti).ok();

    if let Some(session_id) = session_id {
        if deps.session_validation_enabled {
            if !session_service.is_session_active(session_id).await.ok()? {
                debug!(session_id = %session_id, "token references a dead session");
                return None;
            }
        } else {
            debug!("session validation disabled, accepting token on signature alone");
        }
    }

    let user = deps
        .users
        .find_by_id(user_id)
        .await
        .ok()?
        .filter(|u| !u.is_deleted)?;

    Some(AuthUser {
        user_id,
        session_id,
        user,
    })
}

/// Reject unauthenticated requests with 401.
pub fn require_auth(auth: Option<&AuthUser>) -> Result<&AuthUser, AppError> {
    auth.ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
}
