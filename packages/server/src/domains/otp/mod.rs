pub mod commands;
pub mod models;
pub mod service;

pub use models::otp::{Otp, OtpPurpose, OtpStore, PostgresOtpStore};
pub use service::{ConsumedOtp, DeliveryChannel, OtpService};
