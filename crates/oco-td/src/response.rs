//! Typed views over order and order-list responses.
//!
//! Binance returns decimals as strings and omits fields depending on the
//! endpoint (`transactTime` on submit, `updateTime` on query, no
//! `orderReports` on `GET /api/v3/orderList`). Every field that can be
//! missing is optional or defaulted here, and the untouched JSON is kept in
//! `raw` for logging and dry-run previews.

use oco_core::symbol::parse_decimal;
use oco_core::{
    BracketGroup, EntryOrder, Leg, ListOrderStatus, ListStatusType, OrderStatus, OrderType, Side,
    TimeInForce,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ExchangeError;

/// Accepts `"1.5"`, `1.5`, `""` and `null` (the last two read as zero).
fn lenient_decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) if s.is_empty() => Ok(Decimal::ZERO),
        Some(Value::String(s)) => parse_decimal(&s).map_err(serde::de::Error::custom),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()).map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!("not a decimal: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    order_id: u64,
    #[serde(default)]
    client_order_id: String,
    #[serde(default)]
    side: Option<String>,
    #[serde(default, rename = "type")]
    order_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    executed_qty: Decimal,
    #[serde(default, rename = "cummulativeQuoteQty", deserialize_with = "lenient_decimal")]
    cumulative_quote_qty: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    stop_price: Decimal,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(default)]
    transact_time: Option<u64>,
    #[serde(default)]
    update_time: Option<u64>,
    #[serde(default)]
    working_time: Option<u64>,
    #[serde(default)]
    time: Option<u64>,
}

// ---------------------------------------------------------------------------
// OrderAck
// ---------------------------------------------------------------------------

/// A single order as reported by `POST /api/v3/order` or `GET /api/v3/order`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub side: Option<Side>,
    pub order_type: Option<OrderType>,
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    pub cumulative_quote_qty: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub time_in_force: Option<TimeInForce>,
    /// Best available event time (ms): transact, update, working, then order time.
    pub ts: u64,
    pub raw: Value,
}

impl OrderAck {
    pub fn from_value(raw: Value) -> Result<Self, ExchangeError> {
        let r: RawOrder = serde_json::from_value(raw.clone())?;
        Ok(Self::from_raw(r, raw))
    }

    fn from_raw(r: RawOrder, raw: Value) -> Self {
        Self {
            symbol: r.symbol,
            order_id: r.order_id,
            client_order_id: r.client_order_id,
            side: r.side.as_deref().and_then(|s| s.parse().ok()),
            order_type: r.order_type.as_deref().and_then(OrderType::from_exchange),
            status: r.status.as_deref().map(OrderStatus::from_exchange).unwrap_or(OrderStatus::New),
            executed_qty: r.executed_qty,
            cumulative_quote_qty: r.cumulative_quote_qty,
            price: r.price,
            stop_price: r.stop_price,
            time_in_force: r.time_in_force.as_deref().and_then(|s| s.parse().ok()),
            ts: r.transact_time.or(r.update_time).or(r.working_time).or(r.time).unwrap_or(0),
            raw,
        }
    }

    /// Average fill price, `None` when nothing executed.
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        oco_core::average_fill_price(self.executed_qty, self.cumulative_quote_qty)
    }

    /// Registry record for this order. The group id defaults to the client token.
    pub fn to_entry(&self) -> Result<EntryOrder, ExchangeError> {
        let side = self
            .side
            .ok_or_else(|| ExchangeError::Decode(format!("order {} has no side", self.order_id)))?;
        let order_type = self
            .order_type
            .ok_or_else(|| ExchangeError::Decode(format!("order {} has no known type", self.order_id)))?;
        Ok(EntryOrder {
            symbol: self.symbol.clone(),
            side,
            order_type,
            order_id: self.order_id,
            client_order_id: self.client_order_id.clone(),
            status: self.status,
            executed_qty: self.executed_qty,
            cumulative_quote_qty: self.cumulative_quote_qty,
            price: self.price,
            ts: self.ts,
            group_id: self.client_order_id.clone(),
        })
    }

    /// Bracket leg view of this report (needs a known type).
    pub fn to_leg(&self) -> Option<Leg> {
        Some(Leg {
            leg_type: self.order_type?,
            order_id: self.order_id,
            client_order_id: self.client_order_id.clone(),
            status: self.status,
            price: self.price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
        })
    }
}

// ---------------------------------------------------------------------------
// OrderListAck
// ---------------------------------------------------------------------------

/// Member reference inside an order list (`orders[]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMember {
    #[serde(default)]
    pub symbol: String,
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrderList {
    order_list_id: u64,
    #[serde(default)]
    list_client_order_id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    list_status_type: Option<String>,
    #[serde(default)]
    list_order_status: Option<String>,
    #[serde(default)]
    transaction_time: u64,
    #[serde(default)]
    orders: Vec<ListMember>,
    #[serde(default)]
    order_reports: Vec<Value>,
}

/// An order list as reported by `POST /api/v3/orderList/oco` or `GET /api/v3/orderList`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderListAck {
    pub order_list_id: u64,
    pub list_client_order_id: String,
    pub symbol: String,
    /// `None` when the response omitted the field.
    pub list_status_type: Option<ListStatusType>,
    pub list_order_status: Option<ListOrderStatus>,
    pub transaction_time: u64,
    pub orders: Vec<ListMember>,
    /// Per-leg detail. Present on creation, usually absent on query.
    pub order_reports: Vec<OrderAck>,
    pub raw: Value,
}

impl OrderListAck {
    pub fn from_value(raw: Value) -> Result<Self, ExchangeError> {
        let r: RawOrderList = serde_json::from_value(raw.clone())?;
        let order_reports = r
            .order_reports
            .into_iter()
            .map(OrderAck::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            order_list_id: r.order_list_id,
            list_client_order_id: r.list_client_order_id,
            symbol: r.symbol,
            list_status_type: r.list_status_type.as_deref().map(ListStatusType::from_exchange),
            list_order_status: r.list_order_status.as_deref().map(ListOrderStatus::from_exchange),
            transaction_time: r.transaction_time,
            orders: r.orders,
            order_reports,
            raw,
        })
    }

    /// Legs built from `orderReports` (empty when the response had none).
    pub fn legs(&self) -> Vec<Leg> {
        self.order_reports.iter().filter_map(OrderAck::to_leg).collect()
    }

    /// Registry record for this list, linked to the entry it protects.
    pub fn to_bracket(&self, group_id: &str) -> BracketGroup {
        BracketGroup {
            symbol: self.symbol.clone(),
            order_list_id: self.order_list_id,
            list_client_order_id: self.list_client_order_id.clone(),
            list_status_type: self.list_status_type.unwrap_or(ListStatusType::ExecStarted),
            list_order_status: self.list_order_status.unwrap_or(ListOrderStatus::Executing),
            ts: self.transaction_time,
            legs: self.legs(),
            group_id: group_id.to_string(),
            released: false,
        }
    }
}
