//! Order records tracked by the registry: entry orders and bracket groups.
//!
//! Both records are created from exchange-confirmed responses and only
//! mutated afterwards by reconciliation against exchange queries.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{ListOrderStatus, ListStatusType, OrderStatus, OrderType, Side, TimeInForce};

// ---------------------------------------------------------------------------
// Entry order
// ---------------------------------------------------------------------------

/// A single (entry) order as confirmed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryOrder {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub order_id: u64,
    /// Client idempotency token; also the registry key.
    pub client_order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cumulative_quote_qty: Decimal,
    /// Nominal price, zero for market orders.
    #[serde(default)]
    pub price: Decimal,
    /// Submission / last update time (ms).
    #[serde(default)]
    pub ts: u64,
    /// Links this entry to the bracket that will protect it.
    #[serde(default)]
    pub group_id: String,
}

impl EntryOrder {
    /// Average fill price (`cumulative quote / executed qty`), exact decimal.
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        average_fill_price(self.executed_qty, self.cumulative_quote_qty)
    }
}

/// `cumulative_quote / executed_qty`, or `None` when nothing executed.
pub fn average_fill_price(executed_qty: Decimal, cumulative_quote: Decimal) -> Option<Decimal> {
    if executed_qty <= Decimal::ZERO {
        return None;
    }
    cumulative_quote.checked_div(executed_qty).map(|p| p.normalize())
}

// ---------------------------------------------------------------------------
// Bracket group
// ---------------------------------------------------------------------------

/// One leg of a bracket (order list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    #[serde(rename = "type")]
    pub leg_type: OrderType,
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: String,
    pub status: OrderStatus,
    /// Limit price (zero when the leg has none).
    #[serde(default)]
    pub price: Decimal,
    /// Stop trigger price (zero for non-stop legs).
    #[serde(default)]
    pub stop_price: Decimal,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
}

/// A bracket ("OCO") order list protecting an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketGroup {
    pub symbol: String,
    pub order_list_id: u64,
    #[serde(default)]
    pub list_client_order_id: String,
    pub list_status_type: ListStatusType,
    pub list_order_status: ListOrderStatus,
    /// Last status transaction time (ms).
    #[serde(default)]
    pub ts: u64,
    #[serde(default)]
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub group_id: String,
    /// Dropped from the duplicate guard by an explicit release; the exchange
    /// side may still be working.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub released: bool,
}

impl BracketGroup {
    /// The list reached its terminal value (all done, or rejected as a whole).
    pub fn is_terminal(&self) -> bool {
        self.list_status_type == ListStatusType::AllDone
            || matches!(self.list_order_status, ListOrderStatus::AllDone | ListOrderStatus::Reject)
    }

    /// A bracket is active until its list status is terminal or it is released.
    pub fn is_active(&self) -> bool {
        !self.released && !self.is_terminal()
    }

    /// Take-profit leg of a SELL bracket (`LIMIT_MAKER`).
    pub fn take_profit_leg(&self) -> Option<&Leg> {
        self.legs.iter().find(|l| l.leg_type == OrderType::LimitMaker)
    }

    /// Stop leg (`STOP_LOSS_LIMIT`).
    pub fn stop_loss_leg(&self) -> Option<&Leg> {
        self.legs.iter().find(|l| l.leg_type == OrderType::StopLossLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn group(lst: ListStatusType, ord: ListOrderStatus) -> BracketGroup {
        BracketGroup {
            symbol: "BTCUSDT".into(),
            order_list_id: 1,
            list_client_order_id: "oco-sell-lst-1".into(),
            list_status_type: lst,
            list_order_status: ord,
            ts: 0,
            legs: vec![],
            group_id: String::new(),
            released: false,
        }
    }

    #[test]
    fn average_fill_is_exact() {
        assert_eq!(average_fill_price(dec!(0.5), dec!(10000)), Some(dec!(20000)));
        assert_eq!(average_fill_price(dec!(0.0005), dec!(10)), Some(dec!(20000)));
        assert_eq!(average_fill_price(Decimal::ZERO, dec!(10)), None);
    }

    #[test]
    fn active_until_all_done() {
        assert!(group(ListStatusType::ExecStarted, ListOrderStatus::Executing).is_active());
        assert!(!group(ListStatusType::AllDone, ListOrderStatus::AllDone).is_active());
        assert!(!group(ListStatusType::ExecStarted, ListOrderStatus::Reject).is_active());

        let released =
            BracketGroup { released: true, ..group(ListStatusType::ExecStarted, ListOrderStatus::Executing) };
        assert!(!released.is_active());
        assert!(!released.is_terminal());
    }

    #[test]
    fn entry_serializes_with_type_key() {
        let e = EntryOrder {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            order_id: 7,
            client_order_id: "mbuy-abc".into(),
            status: OrderStatus::Filled,
            executed_qty: dec!(0.0005),
            cumulative_quote_qty: dec!(10),
            price: Decimal::ZERO,
            ts: 1,
            group_id: "mbuy-abc".into(),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "MARKET");
        assert_eq!(v["executedQty"], "0.0005");
        let back: EntryOrder = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }
}
