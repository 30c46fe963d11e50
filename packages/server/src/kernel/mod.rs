//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod google;
pub mod hasher;
pub mod jobs;
pub mod test_deps;
pub mod traits;

pub use deps::{LogEmailSender, LogSmsSender, ServerDeps, TwilioSmsAdapter};
pub use google::GoogleTokenVerifier;
pub use hasher::Argon2Hasher;
pub use traits::*;
