//! LazyEyes Common Utilities
//!
//! Shared infrastructure for all LazyEyes crates:
//! - Error types and result aliases
//! - Monotonic frame clock and FPS gating utilities
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
