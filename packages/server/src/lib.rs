// Advisor platform API core.
//
// Authentication, sessions, OTP issuance/verification and delivery.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
