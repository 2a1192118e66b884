//! Shared configuration and errors for Freightline.
//!
//! This crate provides what every other crate needs:
//! - Layered application configuration
//! - Application-wide error types and their HTTP mapping

pub mod config;
pub mod error;


pub use self::config::{AppConfig, AppleConfig, Environment, GoogleConfig, IdentityConfig};
pub use self::error::{AppError, AppResult, ErrorBody};
