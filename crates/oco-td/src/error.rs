//! Exchange error types.

use oco_core::error::OcoError;
use thiserror::Error;

/// HTTP statuses worth retrying: rate limit, IP ban warning, and gateway/server faults.
const RETRYABLE_HTTP: [u16; 6] = [418, 429, 500, 502, 503, 504];

/// Binance codes worth retrying: `-1003` too many requests, `-1021` timestamp outside recvWindow.
const RETRYABLE_CODES: [i64; 2] = [-1003, -1021];

/// Binance code for "Timestamp for this request is outside of the recvWindow".
pub const CODE_TIMESTAMP_OUTSIDE_WINDOW: i64 = -1021;

/// Errors that can occur when talking to the exchange.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Non-2xx response whose body is not a Binance error document.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Binance API error (`{"code": ..., "msg": ...}`).
    #[error("Binance API error {code}: {msg}")]
    Api { status: u16, code: i64, msg: String },

    /// `-2010`: the account cannot cover the order.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Network failure, timeout, connection reset.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Live placement on mainnet without explicit permission.
    #[error("live order on mainnet blocked (allow_mainnet=false)")]
    MainnetBlocked,
}

impl ExchangeError {
    /// Classify a non-2xx response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ApiError {
            code: i64,
            msg: String,
        }

        match serde_json::from_str::<ApiError>(body) {
            Ok(e) if e.code == -2010 => Self::InsufficientBalance(e.msg),
            Ok(e) => Self::Api { status, code: e.code, msg: e.msg },
            Err(_) => Self::Http { status, body: body.to_string() },
        }
    }

    /// Transient failures that a bounded retry may resolve.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => RETRYABLE_HTTP.contains(status),
            Self::Api { status, code, .. } => {
                RETRYABLE_HTTP.contains(status) || RETRYABLE_CODES.contains(code)
            }
            Self::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_timestamp_error(&self) -> bool {
        matches!(self, Self::Api { code: CODE_TIMESTAMP_OUTSIDE_WINDOW, .. })
    }

    /// Exchange error code, when the exchange sent one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::InsufficientBalance(_) => Some(-2010),
            _ => None,
        }
    }

    /// Stable reason code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "HTTP_ERROR",
            Self::Api { .. } => "EXCHANGE_ERROR",
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::MainnetBlocked => "MAINNET_BLOCKED",
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<OcoError> for ExchangeError {
    fn from(e: OcoError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_documents() {
        let e = ExchangeError::from_response(400, r#"{"code":-1021,"msg":"Timestamp outside"}"#);
        assert!(e.is_timestamp_error());
        assert!(e.is_retryable());

        let e = ExchangeError::from_response(400, r#"{"code":-2010,"msg":"Account has insufficient balance"}"#);
        assert_eq!(e.kind(), "INSUFFICIENT_BALANCE");
        assert!(!e.is_retryable());

        let e = ExchangeError::from_response(400, r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#);
        assert_eq!(e.code(), Some(-1013));
        assert!(!e.is_retryable());
    }

    #[test]
    fn status_drives_retry_for_opaque_bodies() {
        assert!(ExchangeError::from_response(503, "<html>").is_retryable());
        assert!(ExchangeError::from_response(429, r#"{"code":-1003,"msg":"Too many requests"}"#).is_retryable());
        assert!(!ExchangeError::from_response(404, "not found").is_retryable());
        assert!(!ExchangeError::MainnetBlocked.is_retryable());
    }
}
