//! Inai Common
//!
//! Common utilities shared by the Inai service mesh crates.
//!
//! This crate provides:
//! - Component-based structured logging with node ID context
//! - Logging configuration backed by `env_logger`
//! - Allocation-free logging macros (`log_debug!`, `log_info!`, ...)

// Export modules
pub mod logging;
#[macro_use]
pub mod macros;

// Re-export traits and types at the root level
pub use logging::{Component, ComponentKey, LogLevel, LogLevelParseError, Logger, LoggingConfig};
