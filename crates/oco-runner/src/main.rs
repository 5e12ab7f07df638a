//! # oco-runner
//!
//! Command-line entry point for the bracket execution system.
//!
//! Loads a JSON configuration file, connects to Binance Spot, opens the order
//! registry and runs one command against them.
//!
//! # Usage
//!
//! ```bash
//! oco-runner config.json signal BTCUSDT BUY --budget 15 --tp 0.02
//! oco-runner config.json watch
//! oco-runner config.json status
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oco_core::config::AppConfig;
use oco_core::retry::RetryPolicy;
use oco_core::{Signal, TimeInForce};
use oco_engine::{
    FillPolicy, Notifier, Orchestrator, OrderExecutor, OrderRegistry, RouterConfig, SignalOverrides, SignalRouter,
    notifier_from_config,
};
use oco_td::binance::BinanceSpot;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Spot bracket-order runner.
#[derive(Parser)]
#[command(name = "oco-runner", about = "Spot bracket-order runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log directory; overrides the config value.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route one BUY or SELL signal.
    Signal {
        symbol: String,
        signal: Signal,

        /// Quote amount to spend on a BUY.
        #[arg(long)]
        budget: Option<Decimal>,

        /// Take-profit distance as a fraction of the fill price.
        #[arg(long)]
        tp: Option<Decimal>,

        /// Stop distance as a fraction of the fill price.
        #[arg(long)]
        sl: Option<Decimal>,

        /// Absolute take-profit price.
        #[arg(long)]
        tp_abs: Option<Decimal>,

        /// Absolute stop trigger price.
        #[arg(long)]
        sl_abs: Option<Decimal>,

        #[arg(long)]
        tif: Option<TimeInForce>,

        #[arg(long)]
        auto_adjust: Option<bool>,

        /// Place real orders instead of a dry run.
        #[arg(long)]
        live: bool,

        /// Permit live orders on a mainnet endpoint.
        #[arg(long)]
        allow_mainnet: bool,
    },
    /// Refresh stored orders from the exchange once.
    Reconcile,
    /// Reconcile and purge periodically until Ctrl+C.
    Watch,
    /// Drop inactive records older than the retention window.
    Purge,
    /// Print a registry summary as JSON.
    Status,
    /// Clear every active bracket for a symbol.
    Release { symbol: String },
    /// Measure the clock offset to the exchange.
    SyncTime,
}

struct App {
    config: AppConfig,
    gateway: Arc<BinanceSpot>,
    registry: Arc<OrderRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    fn new(config: AppConfig) -> Result<Self> {
        let gateway = Arc::new(BinanceSpot::new(&config.exchange)?);
        let registry = Arc::new(OrderRegistry::open(&config.registry.path)?);
        let notifier: Arc<dyn Notifier> = Arc::from(notifier_from_config(&config.notify));
        Ok(Self { config, gateway, registry, notifier })
    }

    fn router(&self, cli_mode: Option<(bool, bool)>) -> SignalRouter {
        let trading = &self.config.trading;
        let executor = OrderExecutor::new(self.gateway.clone())
            .with_retry(RetryPolicy::from_millis(&trading.retry_backoff_ms))
            .with_stop_offset(trading.stop_limit_offset);
        let orchestrator =
            Orchestrator::new(Arc::new(executor), self.registry.clone(), FillPolicy::from_config(trading));

        let mut cfg = RouterConfig::from_config(trading);
        if let Some((live, allow_mainnet)) = cli_mode {
            cfg.mode.dry_run &= !live;
            cfg.mode.allow_mainnet |= allow_mainnet;
        }
        SignalRouter::new(Arc::new(orchestrator), self.notifier.clone(), cfg)
    }

    async fn watch(&self) -> Result<()> {
        let every = Duration::from_secs(self.config.registry.reconcile_interval_secs.max(1));
        let retention = Duration::from_secs(self.config.registry.retention_days * 86_400);
        let mut ticker = tokio::time::interval(every);

        info!("watching {} symbol(s) every {:?}, press Ctrl+C to stop", self.config.symbols.len(), every);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.watch_tick(retention).await,
                res = tokio::signal::ctrl_c() => {
                    res?;
                    info!("shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    async fn watch_tick(&self, retention: Duration) {
        match self.registry.reconcile(self.gateway.as_ref()).await {
            Ok(s) if s.updated > 0 || s.errors > 0 => info!("reconcile: {s:?}"),
            Ok(_) => {}
            Err(e) => error!("reconcile failed: {e}"),
        }
        if let Err(e) = self.registry.purge_old(retention).await {
            error!("purge failed: {e}");
        }

        for entry in self.registry.unprotected_entries().await {
            let watched = self.config.symbols.is_empty() || self.config.symbols.contains(&entry.symbol);
            if !watched || !self.registry.needs_bracket(&entry.symbol, &entry.client_order_id).await {
                continue;
            }
            warn!("{} entry {} filled but unprotected", entry.symbol, entry.client_order_id);
            let text = oco_engine::notify::format_order_message(
                "UNPROTECTED ENTRY",
                &entry.symbol,
                "BUY",
                None,
                Some(&entry.executed_qty),
                &format!("cid={}", entry.client_order_id),
            );
            self.notifier.notify(&text).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Configuration
    let config = oco_core::config::load_config(&cli.config)?;

    // 2. Logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_dir.clone());
    let _log_guard = oco_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), "oco-runner");
    info!(
        "oco-runner starting: config={}, env={:?}, dry_run={}",
        cli.config.display(),
        config.exchange.env,
        config.trading.dry_run
    );

    // 3. Exchange client, registry, notifier
    let app = App::new(config)?;

    // 4. Command
    match cli.command {
        Command::Signal { symbol, signal, budget, tp, sl, tp_abs, sl_abs, tif, auto_adjust, live, allow_mainnet } => {
            if let Err(e) = app.gateway.sync_clock().await {
                warn!("clock sync failed, using local time: {e}");
            }
            let router = app.router(Some((live, allow_mainnet)));
            let overrides =
                SignalOverrides { quote_budget: budget, tp_pct: tp, sl_pct: sl, tp_abs, sl_abs, tif, auto_adjust };
            let out = router.handle_signal(&symbol, Some(signal), &overrides).await;
            info!("{symbol} {signal}: {} ok={}", out.action, out.ok);
            if let Some(e) = &out.error {
                error!("{symbol} {signal}: {e}");
            }
        }
        Command::Reconcile => {
            let s = app.registry.reconcile(app.gateway.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&s)?);
        }
        Command::Watch => {
            if let Err(e) = app.gateway.sync_clock().await {
                warn!("clock sync failed, using local time: {e}");
            }
            app.watch().await?;
        }
        Command::Purge => {
            let retention = Duration::from_secs(app.config.registry.retention_days * 86_400);
            let s = app.registry.purge_old(retention).await?;
            println!("{}", serde_json::to_string_pretty(&s)?);
        }
        Command::Status => {
            let s = app.registry.summary().await;
            println!("{}", serde_json::to_string_pretty(&s)?);
        }
        Command::Release { symbol } => {
            let released = app.registry.release_symbol(&symbol).await?;
            info!("{symbol}: released {} bracket(s) {released:?}", released.len());
        }
        Command::SyncTime => {
            let offset = app.gateway.sync_clock().await?;
            println!("clock offset: {offset} ms");
        }
    }

    info!("oco-runner done");
    Ok(())
}
