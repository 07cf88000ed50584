//! Products Gateway HTTP service

/// Router composition
pub mod app;

/// Environment configuration
pub mod config;

/// Database connection gate
pub mod database;

/// Logging setup
pub mod logging;

/// Validation and error-translation middleware
pub mod middleware;

pub use app::{app, AppState};
