//! Binance Spot access.
//!
//! ```text
//! BinanceSpot            (SpotGateway impl, endpoint mapping)
//! └── SignedClient       (reqwest pool, HMAC signing, recvWindow)
//!     └── ClockSync      (median-of-samples offset to exchange time)
//! ```
//!
//! The clock offset and recvWindow live on the client instance, so several
//! independent sessions can share one process.

pub mod auth;
pub mod client;
pub mod clock;
pub mod spot;

pub use client::SignedClient;
pub use spot::BinanceSpot;
