// HTTP middleware
pub mod device_context;
pub mod jwt_auth;

pub use device_context::*;
pub use jwt_auth::*;
