//! Binance Spot gateway.
//!
//! # REST endpoints
//!
//! | Operation          | Method | Path                     | Signed |
//! |--------------------|--------|--------------------------|--------|
//! | Last price         | GET    | `/api/v3/ticker/price`   | no     |
//! | Exchange info      | GET    | `/api/v3/exchangeInfo`   | no     |
//! | Server time        | GET    | `/api/v3/time`           | no     |
//! | Account balances   | GET    | `/api/v3/account`        | yes    |
//! | Test order         | POST   | `/api/v3/order/test`     | yes    |
//! | Place order        | POST   | `/api/v3/order`          | yes    |
//! | Query order        | GET    | `/api/v3/order`          | yes    |
//! | Place OCO list     | POST   | `/api/v3/orderList/oco`  | yes    |
//! | Query order list   | GET    | `/api/v3/orderList`      | yes    |

use async_trait::async_trait;
use oco_core::config::ExchangeConfig;
use oco_core::symbol::{dec_field, dec_field_or_zero};
use oco_core::SymbolInfo;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use super::client::SignedClient;
use crate::error::ExchangeError;
use crate::request::{OcoRequest, OrderRef, OrderRequest};
use crate::response::{OrderAck, OrderListAck};
use crate::SpotGateway;

/// Binance Spot implementation of [`SpotGateway`].
pub struct BinanceSpot {
    client: SignedClient,
    mainnet: bool,
}

impl BinanceSpot {
    pub fn new(cfg: &ExchangeConfig) -> Result<Self, ExchangeError> {
        Ok(Self { client: SignedClient::new(cfg)?, mainnet: cfg.is_mainnet() })
    }

    pub fn client(&self) -> &SignedClient {
        &self.client
    }

    /// Re-measure the clock offset against the exchange.
    pub async fn sync_clock(&self) -> Result<i64, ExchangeError> {
        self.client.sync_clock().await
    }

    /// Full `/api/v3/account` document.
    pub async fn account(&self) -> Result<Value, ExchangeError> {
        self.client.signed(Method::GET, "/api/v3/account", &[]).await
    }
}

#[async_trait]
impl SpotGateway for BinanceSpot {
    fn is_mainnet(&self) -> bool {
        self.mainnet
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let v = self.client.public_get("/api/v3/ticker/price", &[("symbol", symbol.to_string())]).await?;
        Ok(dec_field(&v, "price")?)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError> {
        let v = self.client.public_get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())]).await?;
        Ok(SymbolInfo::find_in(&v, symbol)?)
    }

    async fn free_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let account = self.account().await?;
        free_balance_in(&account, asset)
    }

    async fn test_order(&self, req: &OrderRequest) -> Result<(), ExchangeError> {
        self.client.signed(Method::POST, "/api/v3/order/test", &req.to_params()).await?;
        info!("[spot] test order ok: {} {} {}", req.symbol, req.side, req.order_type);
        Ok(())
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let v = self.client.signed(Method::POST, "/api/v3/order", &req.to_params()).await?;
        let ack = OrderAck::from_value(v)?;
        info!(
            "[spot] order placed: {} {} {} id={} cid={} status={}",
            req.symbol, req.side, req.order_type, ack.order_id, ack.client_order_id, ack.status
        );
        Ok(ack)
    }

    async fn place_oco(&self, req: &OcoRequest) -> Result<OrderListAck, ExchangeError> {
        let v = self.client.signed(Method::POST, "/api/v3/orderList/oco", &req.to_params()).await?;
        let ack = OrderListAck::from_value(v)?;
        info!(
            "[spot] order list placed: {} {} listId={} lcid={}",
            req.symbol, req.side, ack.order_list_id, ack.list_client_order_id
        );
        Ok(ack)
    }

    async fn query_order(&self, symbol: &str, order: &OrderRef) -> Result<OrderAck, ExchangeError> {
        let mut params = vec![("symbol", symbol.to_string())];
        match order {
            OrderRef::Id(id) => params.push(("orderId", id.to_string())),
            OrderRef::Client(cid) => params.push(("origClientOrderId", cid.clone())),
        }
        let v = self.client.signed(Method::GET, "/api/v3/order", &params).await?;
        OrderAck::from_value(v)
    }

    async fn query_order_list(&self, order_list_id: u64) -> Result<OrderListAck, ExchangeError> {
        let params = [("orderListId", order_list_id.to_string())];
        let v = self.client.signed(Method::GET, "/api/v3/orderList", &params).await?;
        OrderListAck::from_value(v)
    }
}

/// Free balance of `asset` in an `/api/v3/account` document.
pub fn free_balance_in(account: &Value, asset: &str) -> Result<Decimal, ExchangeError> {
    let balances = account
        .get("balances")
        .and_then(Value::as_array)
        .ok_or_else(|| ExchangeError::Decode("account has no balances array".into()))?;
    match balances.iter().find(|b| b.get("asset").and_then(Value::as_str) == Some(asset)) {
        Some(b) => Ok(dec_field_or_zero(b, "free")?),
        None => Ok(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn balance_lookup() {
        let account = json!({
            "makerCommission": 15,
            "balances": [
                {"asset": "BTC", "free": "0.00050000", "locked": "0.00000000"},
                {"asset": "USDT", "free": "125.50000000", "locked": "10.00000000"}
            ]
        });
        assert_eq!(free_balance_in(&account, "USDT").unwrap(), dec!(125.5));
        assert_eq!(free_balance_in(&account, "BTC").unwrap(), dec!(0.0005));
        assert_eq!(free_balance_in(&account, "ETH").unwrap(), Decimal::ZERO);
        assert!(free_balance_in(&json!({}), "BTC").is_err());
    }

    #[test]
    fn gateway_uses_configured_environment() {
        let cfg = ExchangeConfig { env: oco_core::config::Environment::Mainnet, ..Default::default() };
        let spot = BinanceSpot::new(&cfg).unwrap();
        assert!(spot.is_mainnet());
        assert_eq!(spot.client().base_url(), oco_core::config::MAINNET_REST_URL);
        assert_eq!(spot.client().recv_window_ms(), 5_000);
    }
}
