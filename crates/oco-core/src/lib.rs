//! # oco-core
//!
//! Core crate for the spot bracket-order execution system, providing:
//!
//! - **Types** (`types`): enums, filters, entry/bracket records, symbol metadata
//! - **Filters** (`filters`): tick/step quantization and min-notional enforcement
//! - **Retry** (`retry`): bounded retry helper with a fixed backoff schedule
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `OcoError` via thiserror
//! - **Time utilities** (`time_util`): millisecond timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod filters;
pub mod logging;
pub mod retry;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
