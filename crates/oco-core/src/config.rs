//! Configuration parsing for the bracket execution system.
//!
//! The runner reads a single JSON file. Every section and field has a default,
//! so `{}` is a valid (dry-run, testnet) configuration.
//!
//! # Example config
//!
//! ```json
//! {
//!   "exchange": { "env": "testnet", "api_key": "", "secret_key": "" },
//!   "trading":  { "quote_budget": "10", "tp_pct": "0.01", "sl_pct": "0.005",
//!                 "dry_run": false, "allow_mainnet": false },
//!   "registry": { "path": "runtime/orders_state.json", "retention_days": 7 },
//!   "notify":   { "channel": "#trading-bot" },
//!   "symbols":  ["BTCUSDT", "ETHUSDT"]
//! }
//! ```
//!
//! Empty credentials fall back to `BINANCE_API_KEY` / `BINANCE_API_SECRET`,
//! and an empty Slack token falls back to `SLACK_API_KEY`.

use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::TimeInForce;

pub const TESTNET_REST_URL: &str = "https://testnet.binance.vision";
pub const MAINNET_REST_URL: &str = "https://api.binance.com";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Symbols the runner watches.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Log directory; stdout only when absent.
    #[serde(default)]
    pub log_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// Which exchange deployment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Testnet,
    Mainnet,
}

/// Credentials and transport settings for the signed client.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub env: Environment,
    /// Overrides the per-environment REST base URL.
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default = "default_max_recv_window")]
    pub max_recv_window_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Samples taken per clock-offset measurement (minimum 3).
    #[serde(default = "default_clock_samples")]
    pub clock_samples: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            env: Environment::default(),
            rest_url: None,
            recv_window_ms: default_recv_window(),
            max_recv_window_ms: default_max_recv_window(),
            request_timeout_ms: default_request_timeout(),
            clock_samples: default_clock_samples(),
        }
    }
}

impl ExchangeConfig {
    pub fn effective_rest_url(&self) -> String {
        match (&self.rest_url, self.env) {
            (Some(url), _) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            (_, Environment::Testnet) => TESTNET_REST_URL.to_string(),
            (_, Environment::Mainnet) => MAINNET_REST_URL.to_string(),
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.env == Environment::Mainnet
    }
}

fn default_recv_window() -> u64 {
    5_000
}

fn default_max_recv_window() -> u64 {
    60_000
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_clock_samples() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

/// Direction of the one-tick offset between a stop trigger and its limit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLimitOffset {
    /// SELL stop-limit one tick below the trigger, BUY entry-limit one tick above.
    #[default]
    AwayFromTrigger,
    /// Limit price equal to the trigger.
    AtTrigger,
}

/// Trading parameters used by the router and orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_quote_budget")]
    pub quote_budget: Decimal,
    #[serde(default = "default_tp_pct")]
    pub tp_pct: Decimal,
    #[serde(default = "default_sl_pct")]
    pub sl_pct: Decimal,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default = "default_true")]
    pub auto_adjust: bool,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub allow_mainnet: bool,
    /// Submit market buys as `quoteOrderQty` instead of a computed quantity.
    #[serde(default)]
    pub use_quote_order_qty: bool,
    #[serde(default = "default_fill_timeout")]
    pub fill_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Minimum interval between identical signals for one symbol.
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: Vec<u64>,
    #[serde(default)]
    pub stop_limit_offset: StopLimitOffset,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_budget: default_quote_budget(),
            tp_pct: default_tp_pct(),
            sl_pct: default_sl_pct(),
            time_in_force: TimeInForce::default(),
            auto_adjust: true,
            dry_run: true,
            allow_mainnet: false,
            use_quote_order_qty: false,
            fill_timeout_ms: default_fill_timeout(),
            poll_interval_ms: default_poll_interval(),
            debounce_secs: default_debounce(),
            retry_backoff_ms: default_retry_backoff(),
            stop_limit_offset: StopLimitOffset::default(),
        }
    }
}

fn default_quote_budget() -> Decimal {
    Decimal::TEN
}

fn default_tp_pct() -> Decimal {
    Decimal::new(1, 2)
}

fn default_sl_pct() -> Decimal {
    Decimal::new(5, 3)
}

fn default_true() -> bool {
    true
}

fn default_fill_timeout() -> u64 {
    15_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_debounce() -> u64 {
    10
}

fn default_retry_backoff() -> Vec<u64> {
    vec![500, 1_500]
}

// ---------------------------------------------------------------------------
// Registry / notify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            retention_days: default_retention_days(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

fn default_registry_path() -> String {
    "runtime/orders_state.json".into()
}

fn default_retention_days() -> u64 {
    7
}

fn default_reconcile_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Slack bot token; notifications go to the log only when empty.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { token: String::new(), channel: default_channel() }
    }
}

fn default_channel() -> String {
    "#trading-bot".into()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse a config document and fill empty secrets from the environment.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let mut config: AppConfig = serde_json::from_str(content).context("invalid config JSON")?;
    apply_env_fallbacks(&mut config, |k| std::env::var(k).ok());
    Ok(config)
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&content)
}

fn apply_env_fallbacks(config: &mut AppConfig, env: impl Fn(&str) -> Option<String>) {
    let fill = |slot: &mut String, key: &str| {
        if slot.is_empty() {
            if let Some(v) = env(key) {
                *slot = v;
            }
        }
    };
    fill(&mut config.exchange.api_key, "BINANCE_API_KEY");
    fill(&mut config.exchange.secret_key, "BINANCE_API_SECRET");
    fill(&mut config.notify.token, "SLACK_API_KEY");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.exchange.effective_rest_url(), TESTNET_REST_URL);
        assert_eq!(cfg.exchange.recv_window_ms, 5_000);
        assert_eq!(cfg.trading.quote_budget, Decimal::TEN);
        assert_eq!(cfg.trading.tp_pct.to_string(), "0.01");
        assert_eq!(cfg.trading.sl_pct.to_string(), "0.005");
        assert!(cfg.trading.dry_run);
        assert!(!cfg.trading.allow_mainnet);
        assert_eq!(cfg.trading.stop_limit_offset, StopLimitOffset::AwayFromTrigger);
        assert_eq!(cfg.registry.path, "runtime/orders_state.json");
        assert_eq!(cfg.notify.channel, "#trading-bot");
    }

    #[test]
    fn parses_sections() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
                "exchange": {"env": "mainnet", "recv_window_ms": 7000},
                "trading": {"quote_budget": "25.5", "time_in_force": "IOC",
                            "stop_limit_offset": "at_trigger", "retry_backoff_ms": [100]},
                "symbols": ["BTCUSDT"]
            }"#,
        )
        .unwrap();
        assert!(cfg.exchange.is_mainnet());
        assert_eq!(cfg.exchange.effective_rest_url(), MAINNET_REST_URL);
        assert_eq!(cfg.trading.quote_budget.to_string(), "25.5");
        assert_eq!(cfg.trading.time_in_force, TimeInForce::Ioc);
        assert_eq!(cfg.trading.stop_limit_offset, StopLimitOffset::AtTrigger);
        assert_eq!(cfg.trading.retry_backoff_ms, vec![100]);
        assert_eq!(cfg.symbols, vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn rest_url_override_wins() {
        let cfg = ExchangeConfig { rest_url: Some("http://localhost:9000/".into()), ..Default::default() };
        assert_eq!(cfg.effective_rest_url(), "http://localhost:9000");
    }

    #[test]
    fn env_fills_only_empty_secrets() {
        let mut cfg = AppConfig::default();
        cfg.exchange.api_key = "from-file".into();
        apply_env_fallbacks(&mut cfg, |k| Some(format!("env-{k}")));
        assert_eq!(cfg.exchange.api_key, "from-file");
        assert_eq!(cfg.exchange.secret_key, "env-BINANCE_API_SECRET");
        assert_eq!(cfg.notify.token, "env-SLACK_API_KEY");
    }
}
