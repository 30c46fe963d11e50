//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use twilio::{TwilioOptions, TwilioService};

use crate::domains::auth::{AuthService, JwtService};
use crate::domains::otp::{OtpService, PostgresOtpStore};
use crate::domains::sessions::{PostgresSessionStore, SessionService};
use crate::domains::users::PostgresUserStore;
use crate::kernel::jobs::{JobRunner, PostgresDeliveryQueue};
use crate::kernel::traits::{BaseEmailSender, BaseSmsSender, BaseSocialTokenVerifier};
use crate::kernel::{
    Argon2Hasher, GoogleTokenVerifier, LogEmailSender, LogSmsSender, ServerDeps, TwilioSmsAdapter,
};
use crate::server::middleware::{capture_device_context, jwt_auth_middleware};
use crate::server::routes::{auth, health, otp, session};
use crate::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    pub auth_service: Arc<AuthService>,
    pub otp_service: Arc<OtpService>,
    pub session_service: Arc<SessionService>,
}

/// Build the Axum application router and spawn the delivery job runner.
pub fn build_app(pool: PgPool, config: &Config) -> (Router, Arc<ServerDeps>) {
    // Stores
    let users = Arc::new(PostgresUserStore::new(pool.clone()));
    let otps = Arc::new(PostgresOtpStore::new(pool.clone()));
    let sessions = Arc::new(PostgresSessionStore::new(pool.clone()));
    let queue = Arc::new(PostgresDeliveryQueue::new(pool.clone()));

    let hasher = Arc::new(Argon2Hasher::new());

    // SMS transport: Twilio when configured, log-only otherwise
    let sms: Arc<dyn BaseSmsSender> = if config.twilio_enabled {
        let options = TwilioOptions {
            account_sid: config
                .twilio_account_sid
                .clone()
                .unwrap_or_default(),
            auth_token: config.twilio_auth_token.clone().unwrap_or_default(),
            from_number: config.twilio_from_number.clone().unwrap_or_default(),
        };
        Arc::new(TwilioSmsAdapter::new(Arc::new(TwilioService::new(options))))
    } else {
        tracing::warn!("Twilio disabled, SMS delivery is log-only");
        Arc::new(LogSmsSender)
    };

    let email: Arc<dyn BaseEmailSender> = Arc::new(LogEmailSender);

    let google_verifier: Option<Arc<dyn BaseSocialTokenVerifier>> = config
        .google_client_id
        .clone()
        .map(|client_id| {
            Arc::new(GoogleTokenVerifier::new(client_id)) as Arc<dyn BaseSocialTokenVerifier>
        });
    if google_verifier.is_none() {
        tracing::warn!("GOOGLE_CLIENT_ID not set, social login disabled");
    }

    let jwt_service = Arc::new(JwtService::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
        config.access_token_ttl_minutes,
    ));

    if !config.session_validation_enabled {
        tracing::warn!("session validation disabled, access tokens are not checked for live sessions");
    }

    let deps = Arc::new(ServerDeps::new(
        pool.clone(),
        users.clone(),
        otps.clone(),
        sessions.clone(),
        queue.clone(),
        hasher.clone(),
        sms.clone(),
        email.clone(),
        google_verifier.clone(),
        jwt_service.clone(),
        config.session_validation_enabled,
    ));

    // Services
    let otp_service = Arc::new(OtpService::new(
        otps.clone(),
        users.clone(),
        queue,
        hasher.clone(),
        config.otp_ttl_minutes,
        config.reset_otp_ttl_minutes,
    ));
    let session_service = Arc::new(SessionService::new(
        sessions,
        hasher.clone(),
        config.refresh_ttl_days,
    ));
    let auth_service = Arc::new(AuthService::new(
        users,
        otp_service.clone(),
        session_service.clone(),
        hasher,
        jwt_service,
        google_verifier,
        config.reset_otp_ttl_minutes,
    ));

    // Background OTP delivery
    let runner = JobRunner::new(pool, sms, email, deps.otps.clone());
    tokio::spawn(async move {
        if let Err(e) = runner.run_until_shutdown().await {
            tracing::error!(error = %e, "job runner exited with error");
        }
    });

    let app_state = AppState {
        deps: deps.clone(),
        auth_service,
        otp_service,
        session_service: session_service.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // Rate limiting: 10 req/sec with burst of 20, per IP. Auth and OTP
    // endpoints only; health stays unlimited.
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .use_headers()
            .finish()
            .expect("Rate limiter configuration is valid and should never fail"),
    );
    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config,
    };

    let deps_for_middleware = deps.clone();
    let sessions_for_middleware = session_service;

    let api = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/social-login", post(auth::social_login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/complete-profile", post(auth::complete_profile_handler))
        .route(
            "/auth/request-password-reset",
            post(auth::request_password_reset_handler),
        )
        .route(
            "/auth/verify-password-reset-otp",
            post(auth::verify_password_reset_otp_handler),
        )
        .route("/auth/reset-password", post(auth::reset_password_handler))
        .route("/otp/verify", post(otp::verify_otp_handler))
        .route("/otp/resend", post(otp::resend_otp_handler))
        .route("/session/refresh", post(session::refresh_handler))
        .route("/session/revoke", post(session::revoke_handler))
        .layer(rate_limit_layer);

    let app = api
        .route("/health", get(health::health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(
                deps_for_middleware.clone(),
                sessions_for_middleware.clone(),
                req,
                next,
            )
        }))
        .layer(middleware::from_fn(capture_device_context))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    (app, deps)
}
