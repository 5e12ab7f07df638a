//! Typed error definitions shared by every crate in the workspace.
//!
//! [`OcoError`] covers the failures that are not tied to a particular exchange
//! call: configuration, metadata parsing, and local persistence. All variants
//! implement `std::error::Error` via `thiserror`, so they integrate with
//! `anyhow::Result` at the binary edge.

use thiserror::Error;

/// Domain-specific errors for the bracket execution system.
#[derive(Debug, Error)]
pub enum OcoError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Exchange metadata or order response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// A trading filter required by the operation is missing from metadata.
    #[error("missing filter {filter} for {symbol}")]
    MissingFilter { symbol: String, filter: &'static str },

    /// Local state persistence error (registry file I/O).
    #[error("persistence error: {0}")]
    Persistence(String),
}
