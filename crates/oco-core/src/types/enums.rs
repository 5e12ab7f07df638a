//! Enumerations used throughout the execution system.
//!
//! Every enum serializes to the exchange's own spelling (`BUY`,
//! `PARTIALLY_FILLED`, `STOP_LOSS_LIMIT`, ...) so the registry file reads the
//! same as the raw API responses it was built from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OcoError;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = OcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(OcoError::Parse(format!("unknown side: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy signal
// ---------------------------------------------------------------------------

/// A discrete strategy signal. "No signal" is modelled as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = OcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(OcoError::Parse(format!("unknown signal: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Order type / time in force
// ---------------------------------------------------------------------------

/// Spot order types used by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    LimitMaker,
    StopLossLimit,
    TakeProfitLimit,
}

impl OrderType {
    /// Map an exchange `type` string; `None` for types this system never places.
    pub fn from_exchange(s: &str) -> Option<Self> {
        match s {
            "MARKET" => Some(Self::Market),
            "LIMIT" => Some(Self::Limit),
            "LIMIT_MAKER" => Some(Self::LimitMaker),
            "STOP_LOSS_LIMIT" => Some(Self::StopLossLimit),
            "TAKE_PROFIT_LIMIT" => Some(Self::TakeProfitLimit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::LimitMaker => "LIMIT_MAKER",
            Self::StopLossLimit => "STOP_LOSS_LIMIT",
            Self::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time in force for limit-style orders and bracket legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInForce {
    type Err = OcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            other => Err(OcoError::Parse(format!("unknown time in force: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Order status as reported by the exchange, plus the local-only `Timeout`
/// sentinel ("we stopped waiting, exchange state unknown").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    Timeout,
}

impl OrderStatus {
    /// Map an exchange status string. Unknown values are treated as `New`
    /// (still working) so they are re-queried rather than forgotten.
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "NEW" | "PENDING_NEW" => Self::New,
            "PARTIALLY_FILLED" => Self::PartiallyFilled,
            "FILLED" => Self::Filled,
            "CANCELED" => Self::Canceled,
            "PENDING_CANCEL" => Self::PendingCancel,
            "REJECTED" => Self::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => Self::Expired,
            _ => Self::New,
        }
    }

    /// `true` once the exchange will never change this order again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }

    /// `true` when at least some quantity executed on the exchange's report.
    pub fn has_fills(self) -> bool {
        matches!(self, Self::Filled | Self::PartiallyFilled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::PendingCancel => "PENDING_CANCEL",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order list (bracket) status
// ---------------------------------------------------------------------------

/// List-level status type of an order list (`listStatusType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListStatusType {
    Response,
    ExecStarted,
    Updated,
    AllDone,
}

impl ListStatusType {
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "RESPONSE" => Self::Response,
            "EXEC_STARTED" => Self::ExecStarted,
            "UPDATED" => Self::Updated,
            "ALL_DONE" => Self::AllDone,
            _ => Self::ExecStarted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "RESPONSE",
            Self::ExecStarted => "EXEC_STARTED",
            Self::Updated => "UPDATED",
            Self::AllDone => "ALL_DONE",
        }
    }
}

/// Order-level status of an order list (`listOrderStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListOrderStatus {
    Executing,
    AllDone,
    Reject,
}

impl ListOrderStatus {
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "EXECUTING" => Self::Executing,
            "ALL_DONE" => Self::AllDone,
            "REJECT" => Self::Reject,
            _ => Self::Executing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executing => "EXECUTING",
            Self::AllDone => "ALL_DONE",
            Self::Reject => "REJECT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Timeout.is_terminal());
    }

    #[test]
    fn exchange_status_mapping() {
        assert_eq!(OrderStatus::from_exchange("EXPIRED_IN_MATCH"), OrderStatus::Expired);
        assert_eq!(OrderStatus::from_exchange("SOMETHING_NEW"), OrderStatus::New);
        assert_eq!(ListStatusType::from_exchange("ALL_DONE"), ListStatusType::AllDone);
        assert_eq!(ListOrderStatus::from_exchange("REJECT"), ListOrderStatus::Reject);
    }

    #[test]
    fn serde_uses_exchange_spelling() {
        let s = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(s, "\"PARTIALLY_FILLED\"");
        let t: OrderType = serde_json::from_str("\"STOP_LOSS_LIMIT\"").unwrap();
        assert_eq!(t, OrderType::StopLossLimit);
    }

    #[test]
    fn parse_signal_case_insensitive() {
        assert_eq!("buy".parse::<Signal>().unwrap(), Signal::Buy);
        assert!("hold".parse::<Signal>().is_err());
    }
}
