//! # Observability
//!
//! Structured logging for the simulator via `tracing`.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
