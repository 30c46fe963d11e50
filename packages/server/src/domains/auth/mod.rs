pub mod jwt;
pub mod service;
pub mod types;

pub use jwt::{AccessClaims, JwtService, ResetClaims};
pub use service::AuthService;
