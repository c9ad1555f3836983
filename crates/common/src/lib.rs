//! Shared configuration, error types, IDs, and metrics for the bookworm query crates.
//!
//! Architecture role:
//! - defines the compiler configuration threaded through catalog, planner and engine
//! - provides common [`BwqError`] / [`Result`] contracts
//! - hosts the Prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::CompilerConfig;
pub use error::{BwqError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
