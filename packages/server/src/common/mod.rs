// Common types and utilities shared across the application

pub mod error;
pub mod validation;

pub use error::AppError;
