//! Retime Common Utilities
//!
//! Shared infrastructure for all Retime crates:
//! - Error taxonomy, result alias, and failure classification
//! - Engine configuration loading
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
