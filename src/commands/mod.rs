//! Command implementations for the CLI
//!
//! - start: Start the API server
//! - check: Validate configuration

pub mod check;
pub mod start;
