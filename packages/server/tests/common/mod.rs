//! Shared test harness: services wired over in-memory stores.

use std::sync::Arc;

use server_core::domains::auth::{AuthService, JwtService};
use server_core::domains::otp::OtpService;
use server_core::domains::sessions::{DeviceContext, SessionService};
use server_core::kernel::test_deps::{MockHasher, MockSocialTokenVerifier, TestStores};
use server_core::kernel::traits::BaseSocialTokenVerifier;

pub struct TestHarness {
    pub stores: TestStores,
    pub auth: Arc<AuthService>,
    pub otp_service: Arc<OtpService>,
    pub session_service: Arc<SessionService>,
    pub jwt: Arc<JwtService>,
}

pub fn harness() -> TestHarness {
    build_harness(None)
}

pub fn harness_with_verifier(verifier: MockSocialTokenVerifier) -> TestHarness {
    build_harness(Some(Arc::new(verifier)))
}

fn build_harness(verifier: Option<Arc<dyn BaseSocialTokenVerifier>>) -> TestHarness {
    let stores = TestStores::new();
    let hasher = Arc::new(MockHasher);
    let jwt = Arc::new(JwtService::new("test_secret", "test-issuer".to_string(), 15));

    let otp_service = Arc::new(OtpService::new(
        stores.otps.clone(),
        stores.users.clone(),
        stores.queue.clone(),
        hasher.clone(),
        5,
        10,
    ));
    let session_service = Arc::new(SessionService::new(
        stores.sessions.clone(),
        hasher.clone(),
        30,
    ));
    let auth = Arc::new(AuthService::new(
        stores.users.clone(),
        otp_service.clone(),
        session_service.clone(),
        hasher,
        jwt.clone(),
        verifier,
        10,
    ));

    TestHarness {
        stores,
        auth,
        otp_service,
        session_service,
        jwt,
    }
}

pub fn device() -> DeviceContext {
    DeviceContext {
        device_id: Some("test-device".to_string()),
        ip: Some("127.0.0.1".to_string()),
        user_agent: Some("tests".to_string()),
    }
}
