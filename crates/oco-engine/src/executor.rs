//! Order executor: single orders and bracket (OCO) order lists.
//!
//! Every operation follows the same shape:
//!
//! 1. fetch symbol filters and the current price,
//! 2. normalize the caller's intent onto the exchange grid,
//! 3. validate (min qty, min notional, price relations, balance),
//! 4. submit through the bounded retry helper, or preview in dry-run mode.
//!
//! Validation failures never reach the order endpoint. Dry-run single orders
//! go to the validate-only test endpoint; dry-run brackets make no placement
//! call at all.
//!
//! Client tokens:
//!
//! | Operation            | Token                                   |
//! |----------------------|-----------------------------------------|
//! | market buy           | `mbuy-<rid>`                            |
//! | limit buy / sell     | `lbuy-<rid>` / `lsell-<rid>`            |
//! | market sell          | `msell-<rid>`                           |
//! | bracket list / legs  | `oco-<side>-lst-<rid>`, `-a-`, `-b-`    |
//!
//! A token is generated once per call and reused by every retry of that call.

use std::sync::Arc;

use oco_core::config::StopLimitOffset;
use oco_core::filters::{
    ceil_qty_for_notional, ensure_min_notional, normalize_price, normalize_quantity, to_api_string,
};
use oco_core::retry::{RetryPolicy, retry};
use oco_core::{OrderType, Side, SymbolInfo, TimeInForce, TradingFilters};
use oco_td::{
    ExchangeError, OcoLeg, OcoRequest, OrderAck, OrderListAck, OrderRequest, SpotGateway,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ExecError;

/// Execution switches shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecMode {
    /// Preview only; nothing is placed.
    pub dry_run: bool,
    /// Permit live placement when the gateway points at mainnet.
    pub allow_mainnet: bool,
}

impl ExecMode {
    pub fn dry() -> Self {
        Self { dry_run: true, allow_mainnet: false }
    }

    pub fn live(allow_mainnet: bool) -> Self {
        Self { dry_run: false, allow_mainnet }
    }
}

/// Result of a single-order operation.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price, or the reference market price for market orders.
    pub price: Decimal,
    pub qty: Decimal,
    /// Quote amount sent as `quoteOrderQty`, if that path was used.
    pub quote_order_qty: Option<Decimal>,
    pub client_order_id: String,
    pub dry_run: bool,
    /// Exchange acknowledgement (live only).
    pub ack: Option<OrderAck>,
    /// The request as sent (or as it would have been sent).
    pub payload: Value,
}

/// Result of a bracket operation.
#[derive(Debug, Clone)]
pub struct BracketOutcome {
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub above: BracketLeg,
    pub below: BracketLeg,
    /// Price observed right before submission.
    pub last_price: Decimal,
    /// Human-readable relation that was verified, e.g. `20200.00 > last(20000.00) > 19900.00`.
    pub price_relation: String,
    /// `true` when auto-adjust moved a leg price.
    pub adjusted: bool,
    pub list_client_order_id: String,
    pub dry_run: bool,
    pub ack: Option<OrderListAck>,
    pub payload: Value,
}

/// Final prices of one bracket leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketLeg {
    pub order_type: OrderType,
    pub price: Decimal,
    pub stop_price: Option<Decimal>,
}

/// SELL bracket protecting a long position.
#[derive(Debug, Clone)]
pub struct OcoSellParams {
    pub symbol: String,
    pub qty: Decimal,
    /// Take-profit limit price (above leg, `LIMIT_MAKER`).
    pub tp_price: Decimal,
    /// Stop trigger (below leg, `STOP_LOSS_LIMIT`).
    pub sl_stop: Decimal,
    /// Stop-limit price; derived from the offset policy when `None`.
    pub sl_limit: Option<Decimal>,
    pub tif: TimeInForce,
    pub auto_adjust: bool,
    /// Verify the free base balance covers `qty`. Off only for previews of
    /// a position that does not exist yet.
    pub check_balance: bool,
}

/// BUY bracket: breakout entry above, maker fallback below.
#[derive(Debug, Clone)]
pub struct OcoBuyParams {
    pub symbol: String,
    pub qty: Decimal,
    /// Breakout trigger (above leg, `STOP_LOSS_LIMIT`).
    pub entry_stop: Decimal,
    /// Maker fallback price (below leg, `LIMIT_MAKER`).
    pub fallback_limit: Decimal,
    /// Entry limit price; derived from the offset policy when `None`.
    pub entry_limit: Option<Decimal>,
    pub tif: TimeInForce,
    pub auto_adjust: bool,
}

/// New single-order client token, e.g. `mbuy-3f2a9c0d1e4b`.
pub fn new_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", random_id())
}

/// List, above-leg and below-leg tokens sharing one random id.
pub fn new_list_ids(prefix: &str) -> (String, String, String) {
    let rid = random_id();
    (format!("{prefix}-lst-{rid}"), format!("{prefix}-a-{rid}"), format!("{prefix}-b-{rid}"))
}

fn random_id() -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(12);
    s
}

// ---------------------------------------------------------------------------
// OrderExecutor
// ---------------------------------------------------------------------------

/// Places orders through a [`SpotGateway`].
pub struct OrderExecutor {
    gateway: Arc<dyn SpotGateway>,
    retry: RetryPolicy,
    stop_offset: StopLimitOffset,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn SpotGateway>) -> Self {
        Self { gateway, retry: RetryPolicy::default(), stop_offset: StopLimitOffset::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stop_offset(mut self, offset: StopLimitOffset) -> Self {
        self.stop_offset = offset;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn SpotGateway> {
        &self.gateway
    }

    pub fn stop_offset(&self) -> StopLimitOffset {
        self.stop_offset
    }

    // -----------------------------------------------------------------------
    // Single orders
    // -----------------------------------------------------------------------

    /// MARKET BUY spending `quote` of the quote asset.
    ///
    /// The quantity is `quote / price` normalized and raised to meet min
    /// notional. With `use_quote_order_qty` the budget itself is sent as
    /// `quoteOrderQty` and the quantity is only a preview.
    pub async fn market_buy_by_quote(
        &self,
        symbol: &str,
        quote: Decimal,
        use_quote_order_qty: bool,
        mode: ExecMode,
    ) -> Result<OrderOutcome, ExecError> {
        if quote <= Decimal::ZERO {
            return Err(ExecError::InvalidInput(format!("quote budget must be positive, got {quote}")));
        }
        let info = self.gateway.symbol_info(symbol).await?;
        let f = info.filters;
        let px = self.current_price(symbol).await?;

        let q1 = normalize_quantity(quote / px, &f);
        let check = ensure_min_notional(px, q1, &f);
        let qty = if check.satisfied { check.qty } else { q1 };
        if qty <= Decimal::ZERO {
            return Err(ExecError::MinQtyNotSatisfied { qty: q1 });
        }

        let cid = new_client_id("mbuy");
        let mut req = OrderRequest::market(symbol, Side::Buy, cid.clone());
        let quote_order_qty = if use_quote_order_qty {
            if f.min_notional > Decimal::ZERO && quote < f.min_notional {
                return Err(ExecError::MinNotionalNotSatisfied { qty, required: f.min_notional });
            }
            req = req.with_quote_order_qty(to_api_string(quote, Decimal::ZERO));
            Some(quote)
        } else {
            if !check.satisfied {
                return Err(ExecError::MinNotionalNotSatisfied { qty, required: f.min_notional });
            }
            req = req.with_quantity(to_api_string(qty, f.step_qty));
            None
        };

        let ack = self.submit(&req, mode).await?;
        info!("[executor] market buy {symbol} qty={qty} @~{px} cid={cid} dry_run={}", mode.dry_run);
        Ok(OrderOutcome {
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: normalize_price(px, &f),
            qty,
            quote_order_qty,
            client_order_id: cid,
            dry_run: mode.dry_run,
            ack,
            payload: req.payload(),
        })
    }

    /// LIMIT BUY at `price` for `qty`.
    pub async fn limit_buy(
        &self,
        symbol: &str,
        price: Decimal,
        qty: Decimal,
        tif: TimeInForce,
        mode: ExecMode,
    ) -> Result<OrderOutcome, ExecError> {
        self.limit_order(symbol, Side::Buy, price, qty, tif, mode).await
    }

    /// LIMIT SELL at `price` for `qty`.
    pub async fn limit_sell(
        &self,
        symbol: &str,
        price: Decimal,
        qty: Decimal,
        tif: TimeInForce,
        mode: ExecMode,
    ) -> Result<OrderOutcome, ExecError> {
        self.limit_order(symbol, Side::Sell, price, qty, tif, mode).await
    }

    async fn limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        qty: Decimal,
        tif: TimeInForce,
        mode: ExecMode,
    ) -> Result<OrderOutcome, ExecError> {
        let info = self.gateway.symbol_info(symbol).await?;
        let f = info.filters;
        let p = normalize_price(price, &f);
        let q = normalize_quantity(qty, &f);
        if q <= Decimal::ZERO {
            return Err(ExecError::MinQtyNotSatisfied { qty: q });
        }
        let check = ensure_min_notional(p, q, &f);
        if !check.satisfied {
            return Err(ExecError::MinNotionalNotSatisfied { qty: q, required: f.min_notional });
        }

        let prefix = if side == Side::Buy { "lbuy" } else { "lsell" };
        let cid = new_client_id(prefix);
        let req = OrderRequest::limit(
            symbol,
            side,
            to_api_string(check.qty, f.step_qty),
            to_api_string(p, f.tick_size),
            tif,
            cid.clone(),
        );
        let ack = self.submit(&req, mode).await?;
        info!("[executor] limit {side} {symbol} {} @ {p} cid={cid} dry_run={}", check.qty, mode.dry_run);
        Ok(OrderOutcome {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            price: p,
            qty: check.qty,
            quote_order_qty: None,
            client_order_id: cid,
            dry_run: mode.dry_run,
            ack,
            payload: req.payload(),
        })
    }

    /// MARKET SELL of `qty` (lot-size normalized).
    pub async fn market_sell_qty(
        &self,
        symbol: &str,
        qty: Decimal,
        mode: ExecMode,
    ) -> Result<OrderOutcome, ExecError> {
        let info = self.gateway.symbol_info(symbol).await?;
        let f = info.filters;
        let q = normalize_quantity(qty, &f);
        if q <= Decimal::ZERO {
            return Err(ExecError::MinQtyNotSatisfied { qty: q });
        }
        let cid = new_client_id("msell");
        let req = OrderRequest::market(symbol, Side::Sell, cid.clone())
            .with_quantity(to_api_string(q, f.step_qty));
        let ack = self.submit(&req, mode).await?;
        info!("[executor] market sell {symbol} qty={q} cid={cid} dry_run={}", mode.dry_run);
        Ok(OrderOutcome {
            symbol: symbol.to_string(),
            side: Side::Sell,
            order_type: OrderType::Market,
            price: ack.as_ref().and_then(OrderAck::avg_fill_price).unwrap_or_default(),
            qty: q,
            quote_order_qty: None,
            client_order_id: cid,
            dry_run: mode.dry_run,
            ack,
            payload: req.payload(),
        })
    }

    // -----------------------------------------------------------------------
    // Brackets
    // -----------------------------------------------------------------------

    /// SELL bracket: take-profit `LIMIT_MAKER` above, `STOP_LOSS_LIMIT` below.
    ///
    /// Requires `tp > last > stop` and `stop_limit <= stop`.
    pub async fn oco_sell_tp_sl(
        &self,
        p: &OcoSellParams,
        mode: ExecMode,
    ) -> Result<BracketOutcome, ExecError> {
        let symbol = p.symbol.as_str();
        let info = self.gateway.symbol_info(symbol).await?;
        let f = info.filters;
        let tick = f.tick_size;

        let last = self.current_price(symbol).await?;
        let mut tp = normalize_price(p.tp_price, &f);
        let stop = normalize_price(p.sl_stop, &f);
        let mut slm = match p.sl_limit {
            Some(l) => normalize_price(l, &f),
            None => normalize_price(self.stop_limit_default(stop, Side::Sell, tick), &f),
        };
        let q = normalize_quantity(p.qty, &f);
        if q <= Decimal::ZERO {
            return Err(ExecError::MinQtyNotSatisfied { qty: q });
        }

        if !(tp > last && last > stop) {
            return Err(ExecError::PriceRelationInvalid {
                side: Side::Sell,
                detail: format!("tp({tp}) > last({last}) > stop({stop})"),
            });
        }
        if slm > stop {
            return Err(ExecError::StopLimitRelationInvalid {
                detail: format!("stopLimitPrice({slm}) <= stopPrice({stop})"),
            });
        }

        if p.check_balance {
            self.ensure_free(&info, &info.base_asset, q, true).await?;
        }

        let last2 = self.current_price(symbol).await?;
        let mut adjusted = false;
        if p.auto_adjust {
            if tp <= last2 {
                tp = normalize_price(last2 + tick, &f);
                adjusted = true;
            }
            if slm > stop {
                slm = normalize_price(stop - tick, &f);
                adjusted = true;
            }
        }
        if !(tp > last2 && last2 > stop) {
            return Err(ExecError::PriceRelationChanged {
                detail: format!("prev last {last}, now {last2}: tp({tp}) > last > stop({stop}) no longer holds"),
            });
        }
        if adjusted {
            warn!("[executor] {symbol} SELL bracket auto-adjusted: tp={tp} stop_limit={slm} last={last2}");
        }

        check_bracket_notional(&f, q, &[tp, slm])?;

        let (lst, a, b) = new_list_ids("oco-sell");
        let req = OcoRequest {
            symbol: symbol.to_string(),
            side: Side::Sell,
            quantity: to_api_string(q, f.step_qty),
            list_client_order_id: lst.clone(),
            above: OcoLeg::limit_maker(to_api_string(tp, tick), a),
            below: OcoLeg::stop_loss_limit(to_api_string(stop, tick), to_api_string(slm, tick), p.tif, b),
        };
        let relation = format!(
            "{} > last({}) > {}",
            to_api_string(tp, tick),
            to_api_string(last2, tick),
            to_api_string(stop, tick)
        );
        let ack = self.submit_oco(&req, mode).await?;

        Ok(BracketOutcome {
            symbol: symbol.to_string(),
            side: Side::Sell,
            qty: q,
            above: BracketLeg { order_type: OrderType::LimitMaker, price: tp, stop_price: None },
            below: BracketLeg { order_type: OrderType::StopLossLimit, price: slm, stop_price: Some(stop) },
            last_price: last2,
            price_relation: relation,
            adjusted,
            list_client_order_id: lst,
            dry_run: mode.dry_run,
            ack,
            payload: req.payload(),
        })
    }

    /// BUY bracket: breakout `STOP_LOSS_LIMIT` above, maker fallback below.
    ///
    /// Requires `fallback < last < entry_stop` and `entry_limit >= entry_stop`.
    pub async fn oco_buy_breakout(
        &self,
        p: &OcoBuyParams,
        mode: ExecMode,
    ) -> Result<BracketOutcome, ExecError> {
        let symbol = p.symbol.as_str();
        let info = self.gateway.symbol_info(symbol).await?;
        let f = info.filters;
        let tick = f.tick_size;

        let last = self.current_price(symbol).await?;
        let stop = normalize_price(p.entry_stop, &f);
        let mut slm = match p.entry_limit {
            Some(l) => normalize_price(l, &f),
            None => normalize_price(self.stop_limit_default(stop, Side::Buy, tick), &f),
        };
        let mut lim = normalize_price(p.fallback_limit, &f);
        let q = normalize_quantity(p.qty, &f);
        if q <= Decimal::ZERO {
            return Err(ExecError::MinQtyNotSatisfied { qty: q });
        }

        if !(lim < last && last < stop) {
            return Err(ExecError::PriceRelationInvalid {
                side: Side::Buy,
                detail: format!("limit({lim}) < last({last}) < stop({stop})"),
            });
        }
        if slm < stop {
            return Err(ExecError::StopLimitRelationInvalid {
                detail: format!("stopLimitPrice({slm}) >= stopPrice({stop})"),
            });
        }

        let need_quote = q * slm.max(lim);
        self.ensure_free(&info, &info.quote_asset, need_quote, false).await?;

        let last2 = self.current_price(symbol).await?;
        let mut adjusted = false;
        if p.auto_adjust {
            if lim >= last2 {
                lim = normalize_price(last2 - tick, &f);
                adjusted = true;
            }
            if slm < stop {
                slm = normalize_price(stop + tick, &f);
                adjusted = true;
            }
        }
        if !(lim < last2 && last2 < stop) {
            return Err(ExecError::PriceRelationChanged {
                detail: format!("prev last {last}, now {last2}: limit({lim}) < last < stop({stop}) no longer holds"),
            });
        }
        if adjusted {
            warn!("[executor] {symbol} BUY bracket auto-adjusted: limit={lim} entry_limit={slm} last={last2}");
        }

        check_bracket_notional(&f, q, &[slm, lim])?;

        let (lst, a, b) = new_list_ids("oco-buy");
        let req = OcoRequest {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity: to_api_string(q, f.step_qty),
            list_client_order_id: lst.clone(),
            above: OcoLeg::stop_loss_limit(to_api_string(stop, tick), to_api_string(slm, tick), p.tif, a),
            below: OcoLeg::limit_maker(to_api_string(lim, tick), b),
        };
        let relation = format!(
            "{} < last({}) < {}",
            to_api_string(lim, tick),
            to_api_string(last2, tick),
            to_api_string(stop, tick)
        );
        let ack = self.submit_oco(&req, mode).await?;

        Ok(BracketOutcome {
            symbol: symbol.to_string(),
            side: Side::Buy,
            qty: q,
            above: BracketLeg { order_type: OrderType::StopLossLimit, price: slm, stop_price: Some(stop) },
            below: BracketLeg { order_type: OrderType::LimitMaker, price: lim, stop_price: None },
            last_price: last2,
            price_relation: relation,
            adjusted,
            list_client_order_id: lst,
            dry_run: mode.dry_run,
            ack,
            payload: req.payload(),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExecError> {
        let px = self.gateway.price(symbol).await?;
        if px <= Decimal::ZERO {
            return Err(ExecError::InvalidInput(format!("{symbol}: non-positive price {px}")));
        }
        Ok(px)
    }

    /// Stop-limit price for a trigger when the caller gave none.
    fn stop_limit_default(&self, stop: Decimal, side: Side, tick: Decimal) -> Decimal {
        match (self.stop_offset, side) {
            (StopLimitOffset::AtTrigger, _) => stop,
            (StopLimitOffset::AwayFromTrigger, Side::Sell) => stop - tick,
            (StopLimitOffset::AwayFromTrigger, Side::Buy) => stop + tick,
        }
    }

    async fn ensure_free(
        &self,
        info: &SymbolInfo,
        asset: &str,
        required: Decimal,
        base: bool,
    ) -> Result<(), ExecError> {
        let free = self.gateway.free_balance(asset).await?;
        if required <= free {
            return Ok(());
        }
        let asset = asset.to_string();
        warn!("[executor] {}: need {required} {asset}, free {free}", info.symbol);
        Err(if base {
            ExecError::InsufficientBaseBalance { asset, required, free }
        } else {
            ExecError::InsufficientQuoteBalance { asset, required, free }
        })
    }

    fn guard_mainnet(&self, mode: ExecMode) -> Result<(), ExecError> {
        if !mode.dry_run && self.gateway.is_mainnet() && !mode.allow_mainnet {
            return Err(ExecError::MainnetBlocked);
        }
        Ok(())
    }

    /// Test-endpoint validation in dry-run mode, placement otherwise.
    async fn submit(&self, req: &OrderRequest, mode: ExecMode) -> Result<Option<OrderAck>, ExecError> {
        self.guard_mainnet(mode)?;
        let gw: &dyn SpotGateway = self.gateway.as_ref();
        if mode.dry_run {
            retry(&self.retry, ExchangeError::is_retryable, move |_| gw.test_order(req)).await?;
            return Ok(None);
        }
        let ack = retry(&self.retry, ExchangeError::is_retryable, move |attempt| {
            if attempt > 0 {
                warn!("[executor] retrying {} (attempt {})", req.client_order_id, attempt + 1);
            }
            gw.place_order(req)
        })
        .await?;
        Ok(Some(ack))
    }

    /// Bracket placement; dry runs return without any network call.
    async fn submit_oco(&self, req: &OcoRequest, mode: ExecMode) -> Result<Option<OrderListAck>, ExecError> {
        if mode.dry_run {
            info!("[executor] dry-run bracket {} {} qty={}", req.symbol, req.side, req.quantity);
            return Ok(None);
        }
        self.guard_mainnet(mode)?;
        let gw: &dyn SpotGateway = self.gateway.as_ref();
        let ack = retry(&self.retry, ExchangeError::is_retryable, move |attempt| {
            if attempt > 0 {
                warn!("[executor] retrying bracket {} (attempt {})", req.list_client_order_id, attempt + 1);
            }
            gw.place_oco(req)
        })
        .await?;
        info!(
            "[executor] bracket placed {} {} listId={} lcid={}",
            req.symbol, req.side, ack.order_list_id, req.list_client_order_id
        );
        Ok(Some(ack))
    }
}

/// Both legs must individually satisfy min notional at `q`.
fn check_bracket_notional(f: &TradingFilters, q: Decimal, leg_prices: &[Decimal]) -> Result<(), ExecError> {
    if f.min_notional <= Decimal::ZERO {
        return Ok(());
    }
    let required = leg_prices
        .iter()
        .map(|px| ceil_qty_for_notional(f.min_notional, *px, f.step_qty))
        .max()
        .unwrap_or_default();
    if q < required {
        return Err(ExecError::MinNotionalNotSatisfied { qty: q, required });
    }
    Ok(())
}
