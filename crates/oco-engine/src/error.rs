//! Engine error types.
//!
//! | Type            | Raised by      | Meaning                                       |
//! |-----------------|----------------|-----------------------------------------------|
//! | [`ExecError`]   | executor       | validation or placement failure of one order  |
//! | [`FlowError`]   | orchestrator   | entry-then-bracket workflow stopped           |
//! | [`RegistryError`]| registry      | state file could not be written               |
//!
//! Each carries a stable reason code via `kind()` that callers branch on and
//! notifications print.

use oco_core::{OrderStatus, Side};
use oco_td::ExchangeError;
use rust_decimal::Decimal;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ExecError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Input rejected before any filter was applied (non-positive budget, etc.).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Quantity normalized to zero (below `minQty`).
    #[error("quantity {qty} below minimum lot")]
    MinQtyNotSatisfied { qty: Decimal },

    /// Notional cannot reach `minNotional` with a placeable quantity.
    #[error("min notional not satisfied: qty {qty}, required {required}")]
    MinNotionalNotSatisfied { qty: Decimal, required: Decimal },

    /// Bracket prices do not straddle the current price.
    #[error("price relation invalid ({side}): {detail}")]
    PriceRelationInvalid { side: Side, detail: String },

    /// Stop-limit price on the wrong side of its trigger.
    #[error("stop-limit relation invalid: {detail}")]
    StopLimitRelationInvalid { detail: String },

    /// Price moved between validation and submission and could not be repaired.
    #[error("price relation changed: {detail}")]
    PriceRelationChanged { detail: String },

    #[error("insufficient {asset}: need {required}, free {free}")]
    InsufficientBaseBalance { asset: String, required: Decimal, free: Decimal },

    #[error("insufficient {asset}: need {required}, free {free}")]
    InsufficientQuoteBalance { asset: String, required: Decimal, free: Decimal },

    /// Exchange reported `-2010`.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("live order on mainnet blocked (allow_mainnet=false)")]
    MainnetBlocked,

    /// Transport, auth or other exchange failure (after retries).
    #[error(transparent)]
    Exchange(ExchangeError),
}

impl ExecError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::MinQtyNotSatisfied { .. } => "MIN_QTY_NOT_SATISFIED",
            Self::MinNotionalNotSatisfied { .. } => "MIN_NOTIONAL_NOT_SATISFIED",
            Self::PriceRelationInvalid { side: Side::Sell, .. } => "PRICE_RELATION_INVALID(SELL)",
            Self::PriceRelationInvalid { side: Side::Buy, .. } => "PRICE_RELATION_INVALID(BUY)",
            Self::StopLimitRelationInvalid { .. } => "STOP_LIMIT_RELATION_INVALID",
            Self::PriceRelationChanged { .. } => "PRICE_RELATION_CHANGED",
            Self::InsufficientBaseBalance { .. } => "INSUFFICIENT_BASE_BALANCE",
            Self::InsufficientQuoteBalance { .. } => "INSUFFICIENT_QUOTE_BALANCE",
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::MainnetBlocked => "MAINNET_BLOCKED",
            Self::Exchange(e) => e.kind(),
        }
    }

    /// `true` when no request reached the order endpoint.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::InsufficientBalance(_) | Self::Exchange(_))
    }
}

impl From<ExchangeError> for ExecError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::InsufficientBalance(msg) => Self::InsufficientBalance(msg),
            ExchangeError::MainnetBlocked => Self::MainnetBlocked,
            other => Self::Exchange(other),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// The market entry itself could not be placed.
    #[error("entry failed: {0}")]
    Entry(ExecError),

    /// The entry reached CANCELED / REJECTED / EXPIRED.
    #[error("entry {0}")]
    EntryTerminated(OrderStatus),

    /// Deadline passed with nothing executed.
    #[error("entry fill timeout")]
    FillTimeout { client_order_id: String, last_error: Option<String> },

    /// Another bracket is still active for the symbol.
    #[error("duplicate bracket blocked for {symbol}")]
    DuplicateBracket { symbol: String },

    /// Entry filled but the bracket could not be placed.
    #[error("bracket failed after entry {entry_client_order_id}: {source}")]
    Bracket { entry_client_order_id: String, source: ExecError },

    #[error(transparent)]
    Exchange(ExchangeError),
}

impl FlowError {
    pub fn kind(&self) -> String {
        match self {
            Self::Entry(e) => e.kind().to_string(),
            Self::EntryTerminated(st) => format!("entry {st}"),
            Self::FillTimeout { .. } => "entry fill timeout".to_string(),
            Self::DuplicateBracket { .. } => "DUPLICATE_OCO_BLOCKED".to_string(),
            Self::Bracket { source, .. } => source.kind().to_string(),
            Self::Exchange(e) => e.kind().to_string(),
        }
    }
}

impl From<ExchangeError> for FlowError {
    fn from(e: ExchangeError) -> Self {
        Self::Exchange(e)
    }
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error on {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("registry serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Exchange response lacks a field the record needs.
    #[error("invalid order record: {0}")]
    InvalidRecord(#[from] ExchangeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes() {
        let e = ExecError::PriceRelationInvalid { side: Side::Sell, detail: String::new() };
        assert_eq!(e.kind(), "PRICE_RELATION_INVALID(SELL)");
        assert!(e.is_validation());

        let e: ExecError = ExchangeError::InsufficientBalance("no".into()).into();
        assert_eq!(e.kind(), "INSUFFICIENT_BALANCE");
        assert!(!e.is_validation());

        assert_eq!(FlowError::EntryTerminated(OrderStatus::Canceled).kind(), "entry CANCELED");
        assert_eq!(
            FlowError::FillTimeout { client_order_id: "x".into(), last_error: None }.to_string(),
            "entry fill timeout"
        );
        assert_eq!(
            FlowError::DuplicateBracket { symbol: "BTCUSDT".into() }.kind(),
            "DUPLICATE_OCO_BLOCKED"
        );
    }
}
