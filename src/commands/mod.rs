//! Command implementations for the CLI
//!
//! - serve: Start the HTTP server
//! - cost: Price a run from the command line
//! - refresh: Pull upstream pricing
//! - models: List stored pricing
//! - status: Cache and provider status
//! - config: Configuration display and validation

pub mod config;
pub mod cost;
pub mod models;
pub mod refresh;
pub mod serve;
pub mod status;

/// Format a USD amount with enough precision for per-token prices
pub fn format_usd(value: f64) -> String {
    if value == 0.0 {
        "$0".to_string()
    } else if value.abs() < 0.01 {
        format!("${:.6}", value)
    } else {
        format!("${:.4}", value)
    }
}
