//! Signal router: the per-tick entry point.
//!
//! | Signal | Precondition                     | Action                     | Outcome                          |
//! |--------|----------------------------------|----------------------------|----------------------------------|
//! | none   |                                  |                            | `NOOP`                           |
//! | BUY    | active bracket on the symbol     |                            | `SKIP_BUY_ACTIVE_OCO`            |
//! | BUY    |                                  | market buy + SELL bracket  | `BUY_OCO` / `BUY_OCO_FAIL`       |
//! | SELL   | free base balance rounds to zero |                            | `SKIP_SELL_NO_POS`               |
//! | SELL   |                                  | market sell of all free    | `SELL` / `SELL_FAIL`             |
//!
//! A signal identical to the last one submitted for the symbol within the
//! debounce window returns `DEBOUNCED` before any order is sent. Skips are
//! decided first and are never debounced.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use oco_core::config::TradingConfig;
use oco_core::filters::normalize_quantity;
use oco_core::{Side, Signal, TimeInForce};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::executor::{BracketOutcome, ExecMode, OrderOutcome};
use crate::notify::{Notifier, format_order_message};
use crate::orchestrator::{BracketParams, EntryBracketOutcome, EntryRequest, Orchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    Noop,
    Debounced,
    SkipBuyActiveOco,
    BuyOco,
    BuyOcoFail,
    SkipSellNoPos,
    Sell,
    SellFail,
}

impl RouteAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "NOOP",
            Self::Debounced => "DEBOUNCED",
            Self::SkipBuyActiveOco => "SKIP_BUY_ACTIVE_OCO",
            Self::BuyOco => "BUY_OCO",
            Self::BuyOcoFail => "BUY_OCO_FAIL",
            Self::SkipSellNoPos => "SKIP_SELL_NO_POS",
            Self::Sell => "SELL",
            Self::SellFail => "SELL_FAIL",
        }
    }
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`SignalRouter::handle_signal`].
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub ok: bool,
    pub action: RouteAction,
    pub entry: Option<EntryBracketOutcome>,
    pub sell: Option<OrderOutcome>,
    /// Reason code of a failure.
    pub error: Option<String>,
}

impl RouteOutcome {
    fn new(ok: bool, action: RouteAction) -> Self {
        Self { ok, action, entry: None, sell: None, error: None }
    }

    fn failed(action: RouteAction, error: String) -> Self {
        Self { error: Some(error), ..Self::new(false, action) }
    }

    pub fn bracket(&self) -> Option<&BracketOutcome> {
        self.entry.as_ref().map(|e| &e.bracket)
    }
}

/// Per-call parameter overrides; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct SignalOverrides {
    pub quote_budget: Option<Decimal>,
    pub tp_pct: Option<Decimal>,
    pub sl_pct: Option<Decimal>,
    pub tp_abs: Option<Decimal>,
    pub sl_abs: Option<Decimal>,
    pub tif: Option<TimeInForce>,
    pub auto_adjust: Option<bool>,
}

/// Router defaults, taken from the trading config.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub quote_budget: Decimal,
    pub use_quote_order_qty: bool,
    pub bracket: BracketParams,
    pub debounce: Duration,
    pub mode: ExecMode,
}

impl RouterConfig {
    pub fn from_config(cfg: &TradingConfig) -> Self {
        Self {
            quote_budget: cfg.quote_budget,
            use_quote_order_qty: cfg.use_quote_order_qty,
            bracket: BracketParams::from_config(cfg),
            debounce: Duration::from_secs(cfg.debounce_secs),
            mode: ExecMode { dry_run: cfg.dry_run, allow_mainnet: cfg.allow_mainnet },
        }
    }
}

pub struct SignalRouter {
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn Notifier>,
    cfg: RouterConfig,
    last_signal: Mutex<AHashMap<String, (Signal, Instant)>>,
}

impl SignalRouter {
    pub fn new(orchestrator: Arc<Orchestrator>, notifier: Arc<dyn Notifier>, cfg: RouterConfig) -> Self {
        Self { orchestrator, notifier, cfg, last_signal: Mutex::new(AHashMap::new()) }
    }

    pub async fn handle_signal(
        &self,
        symbol: &str,
        signal: Option<Signal>,
        overrides: &SignalOverrides,
    ) -> RouteOutcome {
        match signal {
            None => RouteOutcome::new(true, RouteAction::Noop),
            Some(Signal::Buy) => self.handle_buy(symbol, overrides).await,
            Some(Signal::Sell) => self.handle_sell(symbol).await,
        }
    }

    async fn handle_buy(&self, symbol: &str, o: &SignalOverrides) -> RouteOutcome {
        let registry = self.orchestrator.registry();
        if !registry.can_attach(symbol).await {
            let ids = registry.active_ids(symbol).await;
            let extra = format!("active={ids:?}");
            self.send("SKIP BUY (active OCO exists)", symbol, Side::Buy, None, None, &extra).await;
            return RouteOutcome::new(false, RouteAction::SkipBuyActiveOco);
        }
        if self.debounced(symbol, Signal::Buy).await {
            return RouteOutcome::new(false, RouteAction::Debounced);
        }

        let base = &self.cfg.bracket;
        let req = EntryRequest {
            symbol: symbol.to_string(),
            quote_budget: o.quote_budget.unwrap_or(self.cfg.quote_budget),
            use_quote_order_qty: self.cfg.use_quote_order_qty,
            bracket: BracketParams {
                tp_pct: o.tp_pct.unwrap_or(base.tp_pct),
                sl_pct: o.sl_pct.unwrap_or(base.sl_pct),
                tp_abs: o.tp_abs.or(base.tp_abs),
                sl_abs: o.sl_abs.or(base.sl_abs),
                tif: o.tif.unwrap_or(base.tif),
                auto_adjust: o.auto_adjust.unwrap_or(base.auto_adjust),
            },
        };

        match self.orchestrator.market_buy_then_bracket(&req, self.cfg.mode).await {
            Ok(out) => {
                let extra = format!(
                    "tp={} sl={} list={} dry_run={}",
                    out.tp_price, out.sl_price, out.bracket.list_client_order_id, self.cfg.mode.dry_run
                );
                self.send("BUY+OCO OK", symbol, Side::Buy, Some(&out.avg_fill_price), Some(&out.filled_qty), &extra)
                    .await;
                RouteOutcome { entry: Some(out), ..RouteOutcome::new(true, RouteAction::BuyOco) }
            }
            Err(e) => {
                let kind = e.kind();
                warn!("[router] {symbol} BUY failed: {e}");
                self.send("BUY+OCO FAIL", symbol, Side::Buy, None, None, &format!("err={kind}: {e}")).await;
                RouteOutcome::failed(RouteAction::BuyOcoFail, kind)
            }
        }
    }

    async fn handle_sell(&self, symbol: &str) -> RouteOutcome {
        let executor = self.orchestrator.executor();
        let gw = executor.gateway();

        let position = async {
            let info = gw.symbol_info(symbol).await?;
            let free = gw.free_balance(&info.base_asset).await?;
            Ok::<_, oco_td::ExchangeError>(normalize_quantity(free, &info.filters))
        };
        let qty = match position.await {
            Ok(q) => q,
            Err(e) => {
                warn!("[router] {symbol} SELL position lookup failed: {e}");
                self.send("SELL FAIL", symbol, Side::Sell, None, None, &format!("err={}: {e}", e.kind())).await;
                return RouteOutcome::failed(RouteAction::SellFail, e.kind().to_string());
            }
        };

        if qty <= Decimal::ZERO {
            self.send("SKIP SELL (no position)", symbol, Side::Sell, None, None, "").await;
            return RouteOutcome::new(false, RouteAction::SkipSellNoPos);
        }
        if self.debounced(symbol, Signal::Sell).await {
            return RouteOutcome::new(false, RouteAction::Debounced);
        }

        match executor.market_sell_qty(symbol, qty, self.cfg.mode).await {
            Ok(out) => {
                let extra = format!("cid={} dry_run={}", out.client_order_id, out.dry_run);
                self.send("SELL OK", symbol, Side::Sell, None, Some(&out.qty), &extra).await;
                RouteOutcome { sell: Some(out), ..RouteOutcome::new(true, RouteAction::Sell) }
            }
            Err(e) => {
                warn!("[router] {symbol} SELL failed: {e}");
                self.send("SELL FAIL", symbol, Side::Sell, None, Some(&qty), &format!("err={}: {e}", e.kind())).await;
                RouteOutcome::failed(RouteAction::SellFail, e.kind().to_string())
            }
        }
    }

    /// `true` if the same signal was submitted for `symbol` within the window.
    /// Otherwise records this one.
    async fn debounced(&self, symbol: &str, signal: Signal) -> bool {
        if self.cfg.debounce.is_zero() {
            return false;
        }
        let now = Instant::now();
        let mut last = self.last_signal.lock().await;
        if let Some((prev, at)) = last.get(symbol) {
            if *prev == signal && now.duration_since(*at) < self.cfg.debounce {
                debug!("[router] {symbol} {signal} debounced");
                return true;
            }
        }
        last.insert(symbol.to_string(), (signal, now));
        false
    }

    async fn send(
        &self,
        title: &str,
        symbol: &str,
        side: Side,
        price: Option<&Decimal>,
        qty: Option<&Decimal>,
        extra: &str,
    ) {
        let msg = format_order_message(
            title,
            symbol,
            side.as_str(),
            price.map(|p| p as &dyn fmt::Display),
            qty.map(|q| q as &dyn fmt::Display),
            extra,
        );
        info!("[router] {title} {symbol}");
        self.notifier.notify(&msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OrderExecutor;
    use crate::mock::{MockGateway, RecordingNotifier};
    use crate::orchestrator::FillPolicy;
    use crate::registry::OrderRegistry;
    use oco_core::OrderStatus;
    use oco_core::retry::RetryPolicy;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    struct Harness {
        gw: Arc<MockGateway>,
        notes: Arc<RecordingNotifier>,
        router: SignalRouter,
        registry: Arc<OrderRegistry>,
        _dir: TempDir,
    }

    fn harness(gw: MockGateway, mode: ExecMode) -> Harness {
        harness_with(gw, RouterConfig { mode, ..RouterConfig::from_config(&TradingConfig::default()) })
    }

    fn harness_with(gw: MockGateway, cfg: RouterConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let gw = Arc::new(gw);
        let registry = Arc::new(OrderRegistry::open(dir.path().join("orders_state.json")).unwrap());
        let executor = Arc::new(OrderExecutor::new(gw.clone()).with_retry(RetryPolicy::none()));
        let fill = FillPolicy { timeout: Duration::from_millis(50), poll_interval: Duration::from_millis(10) };
        let orch = Arc::new(Orchestrator::new(executor, registry.clone(), fill));
        let notes = Arc::new(RecordingNotifier::default());
        let router = SignalRouter::new(orch, notes.clone(), cfg);
        Harness { gw, notes, router, registry, _dir: dir }
    }

    fn live() -> ExecMode {
        ExecMode::live(false)
    }

    #[tokio::test]
    async fn no_signal_is_noop() {
        let h = harness(MockGateway::btc(dec!(20000)), live());
        let out = h.router.handle_signal("BTCUSDT", None, &SignalOverrides::default()).await;
        assert!(out.ok);
        assert_eq!(out.action, RouteAction::Noop);
        assert!(h.notes.messages().is_empty());
    }

    #[tokio::test]
    async fn buy_then_repeat_is_skipped() {
        let h = harness(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(0.0005)), live());

        let out = h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &SignalOverrides::default()).await;
        assert!(out.ok, "{:?}", out.error);
        assert_eq!(out.action, RouteAction::BuyOco);
        let entry = out.entry.as_ref().unwrap();
        assert_eq!(entry.filled_qty, dec!(0.0005));
        assert_eq!(entry.avg_fill_price, dec!(20000));
        assert_eq!((entry.tp_price, entry.sl_price), (dec!(20200), dec!(19900)));
        assert!(out.bracket().unwrap().ack.is_some());

        let again = h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &SignalOverrides::default()).await;
        assert!(!again.ok);
        assert_eq!(again.action, RouteAction::SkipBuyActiveOco);
        assert_eq!(h.gw.placed_orders().len(), 1);
        assert_eq!(h.gw.placed_lists().len(), 1);

        let notes = h.notes.messages();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("BUY+OCO OK | BTCUSDT BUY @"));
        assert!(notes[0].contains("tp=20200"));
        assert!(notes[1].contains("SKIP BUY (active OCO exists)"));
    }

    #[tokio::test]
    async fn sell_without_position_is_skipped() {
        let h = harness(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(0.000004)), live());
        let out = h.router.handle_signal("BTCUSDT", Some(Signal::Sell), &SignalOverrides::default()).await;
        assert_eq!(out.action, RouteAction::SkipSellNoPos);
        assert!(h.gw.placed_orders().is_empty());
        assert!(h.notes.messages()[0].contains("SKIP SELL (no position) | BTCUSDT SELL @ - x -"));
    }

    #[tokio::test]
    async fn sell_liquidates_free_balance() {
        let h = harness(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(0.001234567)), live());
        let out = h.router.handle_signal("BTCUSDT", Some(Signal::Sell), &SignalOverrides::default()).await;
        assert_eq!(out.action, RouteAction::Sell);
        assert_eq!(out.sell.as_ref().unwrap().qty, dec!(0.00123));
        assert_eq!(h.gw.placed_orders()[0].quantity.as_deref(), Some("0.00123"));
        assert!(h.notes.messages()[0].contains("SELL OK"));
    }

    #[tokio::test]
    async fn repeated_sell_is_debounced() {
        let h = harness(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(1)), live());
        let first = h.router.handle_signal("BTCUSDT", Some(Signal::Sell), &SignalOverrides::default()).await;
        assert_eq!(first.action, RouteAction::Sell);
        let second = h.router.handle_signal("BTCUSDT", Some(Signal::Sell), &SignalOverrides::default()).await;
        assert_eq!(second.action, RouteAction::Debounced);
        assert_eq!(h.gw.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn buy_failure_is_reported() {
        let h = harness(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(1)), live());
        h.gw.set_place_fill(OrderStatus::New, Some(dec!(0)));
        let out = h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &SignalOverrides::default()).await;
        assert_eq!(out.action, RouteAction::BuyOcoFail);
        assert_eq!(out.error.as_deref(), Some("entry fill timeout"));
        assert!(h.gw.placed_lists().is_empty());
        assert!(h.notes.messages()[0].contains("BUY+OCO FAIL"));
        assert!(h.registry.can_attach("BTCUSDT").await);
    }

    #[tokio::test]
    async fn overrides_replace_defaults() {
        let h = harness(MockGateway::btc(dec!(20000)), ExecMode::dry());
        let o = SignalOverrides {
            quote_budget: Some(dec!(20)),
            tp_pct: Some(dec!(0.02)),
            sl_abs: Some(dec!(19500)),
            ..Default::default()
        };
        let out = h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &o).await;
        let entry = out.entry.unwrap();
        assert_eq!(entry.filled_qty, dec!(0.001));
        assert_eq!((entry.tp_price, entry.sl_price), (dec!(20400), dec!(19500)));
        assert!(h.gw.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn concurrent_buys_place_one_entry() {
        let cfg = RouterConfig {
            debounce: Duration::ZERO,
            mode: live(),
            ..RouterConfig::from_config(&TradingConfig::default())
        };
        let h = harness_with(MockGateway::btc(dec!(20000)).with_balance("BTC", dec!(1)), cfg);
        // The first entry fills on its second poll, so it holds the symbol
        // lock across a sleep while the second signal arrives.
        h.gw.set_place_fill(OrderStatus::New, Some(dec!(0)));
        h.gw.script_queries(vec![Ok((OrderStatus::New, Some(dec!(0)))), Ok((OrderStatus::Filled, None))]);

        let none = SignalOverrides::default();
        let (a, b) = tokio::join!(
            h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &none),
            h.router.handle_signal("BTCUSDT", Some(Signal::Buy), &none),
        );

        assert_eq!(a.action, RouteAction::BuyOco, "{:?}", a.error);
        assert_eq!(b.action, RouteAction::BuyOcoFail);
        assert_eq!(b.error.as_deref(), Some("DUPLICATE_OCO_BLOCKED"));
        assert_eq!(h.gw.placed_orders().len(), 1);
        assert_eq!(h.gw.placed_lists().len(), 1);
        assert!(h.registry.unprotected_entries().await.is_empty());
    }
}
