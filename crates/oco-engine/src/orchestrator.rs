//! Entry-then-bracket workflow.
//!
//! ```text
//! SUBMITTED ──(FILLED / PARTIALLY_FILLED in the ack)──────────────► FILLED
//!     │
//!     └──► POLLING ──► FILLED | CANCELED | REJECTED | EXPIRED | TIMEOUT
//! ```
//!
//! Terminal failures abort without a bracket. A timeout with some quantity
//! executed proceeds on that quantity; the rest of the entry is left to the
//! caller and reported as `unfilled_qty`.

use std::sync::Arc;
use std::time::Duration;

use oco_core::config::TradingConfig;
use oco_core::filters::normalize_price;
use oco_core::{BracketGroup, EntryOrder, OrderStatus, TimeInForce, TradingFilters};
use oco_td::{OrderAck, SpotGateway};
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ExecError, FlowError};
use crate::executor::{BracketOutcome, ExecMode, OcoSellParams, OrderExecutor, OrderOutcome};
use crate::registry::OrderRegistry;

/// Deadline and cadence of fill polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(15), poll_interval: Duration::from_millis(500) }
    }
}

impl FillPolicy {
    pub fn from_config(cfg: &TradingConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.fill_timeout_ms),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
        }
    }
}

/// Last known state of a polled order.
#[derive(Debug, Clone)]
pub struct FillReport {
    /// Exchange status, or `Timeout` when the deadline passed first.
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    pub cumulative_quote_qty: Decimal,
    /// Most recent successful query (or the submit ack on the fast path).
    pub last: Option<OrderAck>,
    pub last_error: Option<String>,
}

impl FillReport {
    fn from_ack(ack: &OrderAck) -> Self {
        Self {
            status: ack.status,
            executed_qty: ack.executed_qty,
            cumulative_quote_qty: ack.cumulative_quote_qty,
            last: Some(ack.clone()),
            last_error: None,
        }
    }

    pub fn avg_fill_price(&self) -> Option<Decimal> {
        oco_core::average_fill_price(self.executed_qty, self.cumulative_quote_qty)
    }
}

/// Poll an order until it is terminal or `policy.timeout` elapses.
pub async fn wait_fill(
    gateway: &dyn SpotGateway,
    symbol: &str,
    order_id: Option<u64>,
    client_order_id: &str,
    policy: FillPolicy,
) -> FillReport {
    let deadline = Instant::now() + policy.timeout;
    let mut last: Option<OrderAck> = None;
    let mut last_error = None;

    loop {
        match gateway.query_order_with_fallback(symbol, order_id, client_order_id).await {
            Ok(ack) => {
                debug!("[fill] {symbol} {client_order_id} {} exec={}", ack.status, ack.executed_qty);
                if ack.status.is_terminal() {
                    let mut report = FillReport::from_ack(&ack);
                    report.last_error = last_error;
                    return report;
                }
                last = Some(ack);
            }
            Err(e) => {
                debug!("[fill] {symbol} {client_order_id} query failed: {e}");
                last_error = Some(e.to_string());
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep((deadline - now).min(policy.poll_interval)).await;
    }

    warn!("[fill] {symbol} {client_order_id} not terminal after {:?}", policy.timeout);
    FillReport {
        status: OrderStatus::Timeout,
        executed_qty: last.as_ref().map(|a| a.executed_qty).unwrap_or_default(),
        cumulative_quote_qty: last.as_ref().map(|a| a.cumulative_quote_qty).unwrap_or_default(),
        last,
        last_error,
    }
}

// ---------------------------------------------------------------------------
// Bracket pricing
// ---------------------------------------------------------------------------

/// How the protective bracket is priced from the average fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketParams {
    pub tp_pct: Decimal,
    pub sl_pct: Decimal,
    /// Absolute take-profit; wins over `tp_pct`.
    pub tp_abs: Option<Decimal>,
    /// Absolute stop trigger; wins over `sl_pct`.
    pub sl_abs: Option<Decimal>,
    pub tif: TimeInForce,
    pub auto_adjust: bool,
}

impl BracketParams {
    pub fn from_config(cfg: &TradingConfig) -> Self {
        Self {
            tp_pct: cfg.tp_pct,
            sl_pct: cfg.sl_pct,
            tp_abs: None,
            sl_abs: None,
            tif: cfg.time_in_force,
            auto_adjust: cfg.auto_adjust,
        }
    }
}

/// Take-profit and stop trigger for a long entry filled at `avg`, on the tick grid.
pub fn bracket_prices(avg: Decimal, p: &BracketParams, f: &TradingFilters) -> (Decimal, Decimal) {
    let tp = p.tp_abs.unwrap_or(avg * (Decimal::ONE + p.tp_pct));
    let sl = p.sl_abs.unwrap_or(avg * (Decimal::ONE - p.sl_pct));
    (normalize_price(tp, f), normalize_price(sl, f))
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Market entry sized by a quote budget, protected by a SELL bracket.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub symbol: String,
    pub quote_budget: Decimal,
    pub use_quote_order_qty: bool,
    pub bracket: BracketParams,
}

#[derive(Debug, Clone)]
pub struct EntryBracketOutcome {
    pub entry: OrderOutcome,
    /// Entry status the bracket was sized on (`Timeout` for a partial timeout).
    pub fill_status: OrderStatus,
    pub avg_fill_price: Decimal,
    pub filled_qty: Decimal,
    /// Requested minus executed; left working on the exchange.
    pub unfilled_qty: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub bracket: BracketOutcome,
    /// Registry records (live runs only). An entry whose wait ran out is
    /// stored as `TIMEOUT` until reconcile fetches its exchange status.
    pub entry_record: Option<EntryOrder>,
    pub bracket_record: Option<BracketGroup>,
}

pub struct Orchestrator {
    executor: Arc<OrderExecutor>,
    registry: Arc<OrderRegistry>,
    fill: FillPolicy,
}

impl Orchestrator {
    pub fn new(executor: Arc<OrderExecutor>, registry: Arc<OrderRegistry>, fill: FillPolicy) -> Self {
        Self { executor, registry, fill }
    }

    pub fn executor(&self) -> &Arc<OrderExecutor> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    /// Buy at market, wait for the fill, attach a SELL bracket on the
    /// executed quantity.
    ///
    /// The whole sequence runs under the symbol lock so the duplicate guard
    /// cannot be passed twice concurrently.
    pub async fn market_buy_then_bracket(
        &self,
        req: &EntryRequest,
        mode: ExecMode,
    ) -> Result<EntryBracketOutcome, FlowError> {
        let symbol = req.symbol.as_str();
        let _symbol_guard = self.registry.lock_symbol(symbol).await;

        // A concurrent signal may have attached a bracket while this one waited
        // for the lock; refuse before buying anything.
        if !self.registry.can_attach(symbol).await {
            warn!("[orchestrator] {symbol} entry blocked: another bracket is active");
            return Err(FlowError::DuplicateBracket { symbol: symbol.to_string() });
        }

        let entry = self
            .executor
            .market_buy_by_quote(symbol, req.quote_budget, req.use_quote_order_qty, mode)
            .await
            .map_err(FlowError::Entry)?;

        if mode.dry_run {
            return self.preview_bracket(req, entry).await;
        }

        let Some(ack) = entry.ack.clone() else {
            return Err(FlowError::Entry(ExecError::InvalidInput("live entry returned no ack".into())));
        };

        let report = if ack.status.has_fills() {
            debug!("[orchestrator] {symbol} fast path: {}", ack.status);
            FillReport::from_ack(&ack)
        } else {
            wait_fill(self.executor.gateway().as_ref(), symbol, Some(ack.order_id), &entry.client_order_id, self.fill)
                .await
        };

        let mut recorded = report.last.clone().unwrap_or_else(|| ack.clone());
        if report.status == OrderStatus::Timeout {
            recorded.status = OrderStatus::Timeout;
        }
        let entry_record = self.record_entry(&recorded).await;

        match report.status {
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => {
                warn!("[orchestrator] {symbol} entry {} ended {}", entry.client_order_id, report.status);
                return Err(FlowError::EntryTerminated(report.status));
            }
            _ if report.executed_qty <= Decimal::ZERO => {
                warn!("[orchestrator] {symbol} entry {} not filled in time", entry.client_order_id);
                return Err(FlowError::FillTimeout {
                    client_order_id: entry.client_order_id.clone(),
                    last_error: report.last_error,
                });
            }
            _ => {}
        }

        let avg = match report.avg_fill_price() {
            Some(p) => p,
            None => self.executor.gateway().price(symbol).await?,
        };
        let filled = report.executed_qty;
        let unfilled = (entry.qty - filled).max(Decimal::ZERO);
        if unfilled > Decimal::ZERO {
            warn!("[orchestrator] {symbol} partial entry: filled {filled}, {unfilled} left working");
        }

        let info = self.executor.gateway().symbol_info(symbol).await?;
        let (tp, sl) = bracket_prices(avg, &req.bracket, &info.filters);

        if !self.registry.can_attach(symbol).await {
            warn!("[orchestrator] {symbol} bracket blocked: another bracket is active");
            return Err(FlowError::DuplicateBracket { symbol: symbol.to_string() });
        }

        let params = sell_params(req, filled, tp, sl, true);
        let bracket = self.executor.oco_sell_tp_sl(&params, mode).await.map_err(|source| {
            error!("[orchestrator] {symbol} entry {} filled but bracket failed: {source}", entry.client_order_id);
            FlowError::Bracket { entry_client_order_id: entry.client_order_id.clone(), source }
        })?;

        let group_id = entry.client_order_id.as_str();
        let bracket_record = match &bracket.ack {
            Some(list) => match self.registry.record_bracket(list, group_id).await {
                Ok(b) => Some(b),
                Err(e) => {
                    error!("[orchestrator] {symbol} bracket {} not recorded: {e}", list.order_list_id);
                    None
                }
            },
            None => None,
        };

        info!(
            "[orchestrator] {symbol} entry {} avg={avg} qty={filled} -> tp={tp} sl={sl} list={} ({})",
            entry.client_order_id, bracket.list_client_order_id, bracket.price_relation
        );
        Ok(EntryBracketOutcome {
            entry,
            fill_status: report.status,
            avg_fill_price: avg,
            filled_qty: filled,
            unfilled_qty: unfilled,
            tp_price: tp,
            sl_price: sl,
            bracket,
            entry_record,
            bracket_record,
        })
    }

    /// Dry run: assume the requested quantity filled at the current price.
    async fn preview_bracket(&self, req: &EntryRequest, entry: OrderOutcome) -> Result<EntryBracketOutcome, FlowError> {
        let info = self.executor.gateway().symbol_info(&req.symbol).await?;
        let avg = entry.price;
        let filled = entry.qty;
        let (tp, sl) = bracket_prices(avg, &req.bracket, &info.filters);

        let params = sell_params(req, filled, tp, sl, false);
        let bracket = self
            .executor
            .oco_sell_tp_sl(&params, ExecMode::dry())
            .await
            .map_err(|source| FlowError::Bracket { entry_client_order_id: entry.client_order_id.clone(), source })?;

        info!("[orchestrator] {} dry run: qty={filled} @~{avg} -> tp={tp} sl={sl}", req.symbol);
        Ok(EntryBracketOutcome {
            entry,
            fill_status: OrderStatus::Filled,
            avg_fill_price: avg,
            filled_qty: filled,
            unfilled_qty: Decimal::ZERO,
            tp_price: tp,
            sl_price: sl,
            bracket,
            entry_record: None,
            bracket_record: None,
        })
    }

    async fn record_entry(&self, ack: &OrderAck) -> Option<EntryOrder> {
        match self.registry.record_entry(ack).await {
            Ok(e) => Some(e),
            Err(e) => {
                error!("[orchestrator] {} entry {} not recorded: {e}", ack.symbol, ack.client_order_id);
                None
            }
        }
    }
}

fn sell_params(req: &EntryRequest, qty: Decimal, tp: Decimal, sl: Decimal, check_balance: bool) -> OcoSellParams {
    OcoSellParams {
        symbol: req.symbol.clone(),
        qty,
        tp_price: tp,
        sl_stop: sl,
        sl_limit: None,
        tif: req.bracket.tif,
        auto_adjust: req.bracket.auto_adjust,
        check_balance,
    }
}
