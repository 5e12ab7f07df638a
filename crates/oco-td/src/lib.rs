//! # oco-td
//!
//! Exchange access for the bracket execution system.
//!
//! Everything above this crate talks to the exchange through the
//! [`SpotGateway`] trait, so the executor, orchestrator and registry can be
//! driven by a scripted gateway in tests.
//!
//! | Exchange | Module    | Endpoints                                        |
//! |----------|-----------|--------------------------------------------------|
//! | Binance  | `binance` | Spot REST (`/api/v3/*`), HMAC-SHA256 signed      |

pub mod binance;
pub mod error;
pub mod request;
pub mod response;

use async_trait::async_trait;
use oco_core::SymbolInfo;
use rust_decimal::Decimal;
use tracing::debug;

pub use error::ExchangeError;
pub use request::{OcoLeg, OcoRequest, OrderRef, OrderRequest};
pub use response::{ListMember, OrderAck, OrderListAck};

/// Spot trading surface used by the execution layer.
///
/// All methods take `&self`; implementations must be safe to share between
/// tasks.
#[async_trait]
pub trait SpotGateway: Send + Sync {
    /// `true` when orders would hit real funds.
    fn is_mainnet(&self) -> bool;

    /// Last traded price.
    async fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Asset names and trading filters for `symbol`.
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError>;

    /// Free (unlocked) balance of `asset`, zero if the account holds none.
    async fn free_balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;

    /// Validate an order without placing it (`/api/v3/order/test`).
    async fn test_order(&self, req: &OrderRequest) -> Result<(), ExchangeError>;

    /// Place a single order.
    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// Place a bracket order list.
    async fn place_oco(&self, req: &OcoRequest) -> Result<OrderListAck, ExchangeError>;

    /// Look up one order.
    async fn query_order(&self, symbol: &str, order: &OrderRef) -> Result<OrderAck, ExchangeError>;

    /// Look up an order list by id.
    async fn query_order_list(&self, order_list_id: u64) -> Result<OrderListAck, ExchangeError>;

    /// Query by exchange id, falling back to the client token when the id is
    /// unknown or the lookup fails.
    async fn query_order_with_fallback(
        &self,
        symbol: &str,
        order_id: Option<u64>,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        if let Some(id) = order_id.filter(|id| *id > 0) {
            match self.query_order(symbol, &OrderRef::Id(id)).await {
                Ok(ack) => return Ok(ack),
                Err(e) if client_order_id.is_empty() => return Err(e),
                Err(e) => debug!("[gateway] {symbol} order {id} lookup failed ({e}), trying client id"),
            }
        }
        self.query_order(symbol, &OrderRef::Client(client_order_id.to_string())).await
    }
}
