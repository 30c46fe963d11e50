pub mod models;
pub mod service;

pub use models::session::{NewSession, PostgresSessionStore, Session, SessionStore};
pub use service::{CreatedSession, DeviceContext, SessionService};
