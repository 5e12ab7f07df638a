//! Wire-ready order requests.
//!
//! Prices and quantities are carried as already-formatted strings: the
//! executor normalizes them against the symbol filters before building a
//! request, and the client sends them verbatim.

use oco_core::{OrderType, Side, TimeInForce};
use serde_json::{Map, Value};

/// A single (non-list) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Option<String>,
    /// Quote amount to spend (market buys only).
    pub quote_order_qty: Option<String>,
    pub price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, client_order_id: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity: None,
            quote_order_qty: None,
            price: None,
            time_in_force: None,
            client_order_id,
        }
    }

    pub fn limit(
        symbol: &str,
        side: Side,
        quantity: String,
        price: String,
        tif: TimeInForce,
        client_order_id: String,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity: Some(quantity),
            quote_order_qty: None,
            price: Some(price),
            time_in_force: Some(tif),
            client_order_id,
        }
    }

    pub fn with_quantity(mut self, qty: String) -> Self {
        self.quantity = Some(qty);
        self
    }

    pub fn with_quote_order_qty(mut self, quote: String) -> Self {
        self.quote_order_qty = Some(quote);
        self
    }

    /// Request parameters in send order (without timestamp / signature).
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
        ];
        if let Some(q) = &self.quantity {
            p.push(("quantity", q.clone()));
        }
        if let Some(q) = &self.quote_order_qty {
            p.push(("quoteOrderQty", q.clone()));
        }
        if let Some(px) = &self.price {
            p.push(("price", px.clone()));
        }
        if let Some(tif) = self.time_in_force {
            p.push(("timeInForce", tif.as_str().to_string()));
        }
        if !self.client_order_id.is_empty() {
            p.push(("newClientOrderId", self.client_order_id.clone()));
        }
        p.push(("newOrderRespType", "FULL".to_string()));
        p
    }

    /// JSON preview of the request, as returned by dry runs.
    pub fn payload(&self) -> Value {
        params_to_json(&self.to_params())
    }
}

type LegKeys = [&'static str; 5];

const ABOVE_KEYS: LegKeys =
    ["aboveType", "aboveClientOrderId", "abovePrice", "aboveStopPrice", "aboveTimeInForce"];
const BELOW_KEYS: LegKeys =
    ["belowType", "belowClientOrderId", "belowPrice", "belowStopPrice", "belowTimeInForce"];

/// One leg of an order-list (OCO) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcoLeg {
    pub leg_type: OrderType,
    pub price: Option<String>,
    pub stop_price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: String,
}

impl OcoLeg {
    /// Maker limit leg (price only).
    pub fn limit_maker(price: String, client_order_id: String) -> Self {
        Self {
            leg_type: OrderType::LimitMaker,
            price: Some(price),
            stop_price: None,
            time_in_force: None,
            client_order_id,
        }
    }

    /// Stop-loss-limit leg (trigger + limit price).
    pub fn stop_loss_limit(
        stop_price: String,
        limit_price: String,
        tif: TimeInForce,
        client_order_id: String,
    ) -> Self {
        Self {
            leg_type: OrderType::StopLossLimit,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            time_in_force: Some(tif),
            client_order_id,
        }
    }

    fn push_params(&self, keys: &LegKeys, p: &mut Vec<(&'static str, String)>) {
        let [ty, cid, price, stop, tif] = *keys;
        p.push((ty, self.leg_type.as_str().to_string()));
        if !self.client_order_id.is_empty() {
            p.push((cid, self.client_order_id.clone()));
        }
        if let Some(px) = &self.price {
            p.push((price, px.clone()));
        }
        if let Some(sp) = &self.stop_price {
            p.push((stop, sp.clone()));
        }
        if let Some(t) = self.time_in_force {
            p.push((tif, t.as_str().to_string()));
        }
    }
}

/// A bracket order list (`POST /api/v3/orderList/oco`).
///
/// The three client tokens are generated once per executor call and reused
/// across retries so the exchange can deduplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: String,
    pub list_client_order_id: String,
    pub above: OcoLeg,
    pub below: OcoLeg,
}

impl OcoRequest {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("quantity", self.quantity.clone()),
        ];
        if !self.list_client_order_id.is_empty() {
            p.push(("listClientOrderId", self.list_client_order_id.clone()));
        }
        self.above.push_params(&ABOVE_KEYS, &mut p);
        self.below.push_params(&BELOW_KEYS, &mut p);
        p.push(("newOrderRespType", "RESULT".to_string()));
        p
    }

    pub fn payload(&self) -> Value {
        params_to_json(&self.to_params())
    }
}

/// How to look an order up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(u64),
    Client(String),
}

fn params_to_json(params: &[(&'static str, String)]) -> Value {
    let map: Map<String, Value> =
        params.iter().map(|(k, v)| (k.to_string(), Value::String(v.clone()))).collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_buy_by_quote_params() {
        let req = OrderRequest::market("BTCUSDT", Side::Buy, "mbuy-abc".into())
            .with_quote_order_qty("10".into());
        let p = req.to_params();
        assert!(p.contains(&("quoteOrderQty", "10".to_string())));
        assert!(!p.iter().any(|(k, _)| *k == "quantity"));
        assert_eq!(req.payload()["newClientOrderId"], "mbuy-abc");
    }

    #[test]
    fn oco_sell_params_use_above_below_prefixes() {
        let req = OcoRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Sell,
            quantity: "0.00050".into(),
            list_client_order_id: "oco-sell-lst-1".into(),
            above: OcoLeg::limit_maker("20200.00".into(), "oco-sell-a-1".into()),
            below: OcoLeg::stop_loss_limit(
                "19900.00".into(),
                "19899.99".into(),
                TimeInForce::Gtc,
                "oco-sell-b-1".into(),
            ),
        };
        let v = req.payload();
        assert_eq!(v["aboveType"], "LIMIT_MAKER");
        assert_eq!(v["abovePrice"], "20200.00");
        assert!(v.get("aboveStopPrice").is_none());
        assert_eq!(v["belowType"], "STOP_LOSS_LIMIT");
        assert_eq!(v["belowStopPrice"], "19900.00");
        assert_eq!(v["belowPrice"], "19899.99");
        assert_eq!(v["belowTimeInForce"], "GTC");
        assert_eq!(v["newOrderRespType"], "RESULT");
    }
}
