pub mod auth;
pub mod otp;
pub mod sessions;
pub mod users;
