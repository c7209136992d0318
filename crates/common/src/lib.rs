//! SPEAR Common Library
//!
//! Shared code for the SPEAR ranking crates including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use errors::{SpearError, Result};
pub use config::{AppConfig, RankingSettings};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
