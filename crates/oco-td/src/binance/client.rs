//! Signed Binance REST client.
//!
//! Owns the HTTP connection pool, credentials, the clock offset and the
//! current `recvWindow`. Every signed call is stamped with the corrected
//! exchange time. A `-1021` (timestamp outside recvWindow) response triggers
//! one clock resync and exactly one retry of the original request; every other
//! failure is returned to the caller as a typed [`ExchangeError`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use oco_core::config::ExchangeConfig;
use oco_core::time_util::now_ms_i64;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::auth;
use super::clock::{ClockSample, ClockSync, MIN_CLOCK_SAMPLES, estimate_offset};
use crate::error::ExchangeError;

/// Headroom added on top of the observed drift when widening `recvWindow`.
const RECV_WINDOW_MARGIN_MS: u64 = 1_000;

/// Authenticated REST client for one Binance deployment.
pub struct SignedClient {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    recv_window_ms: AtomicU64,
    max_recv_window_ms: u64,
    clock_samples: usize,
    clock: ClockSync,
}

impl SignedClient {
    pub fn new(cfg: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            secret_key: cfg.secret_key.clone(),
            base_url: cfg.effective_rest_url(),
            recv_window_ms: AtomicU64::new(cfg.recv_window_ms),
            max_recv_window_ms: cfg.max_recv_window_ms.max(cfg.recv_window_ms),
            clock_samples: cfg.clock_samples.max(MIN_CLOCK_SAMPLES),
            clock: ClockSync::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recv_window_ms(&self) -> u64 {
        self.recv_window_ms.load(Ordering::Relaxed)
    }

    pub fn clock_offset_ms(&self) -> i64 {
        self.clock.offset_ms()
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Unsigned GET (market data, server time, exchange info).
    pub async fn public_get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ExchangeError> {
        let url = if params.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, auth::encode_query(params))
        };
        let resp = self.http.get(&url).send().await?;
        read_body(resp).await
    }

    /// Signed request with a single resync-and-retry on `-1021`.
    pub async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        retry_on_timestamp(path, || self.send_signed(method.clone(), path, params), || self.sync_clock()).await
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", self.recv_window_ms().to_string()));
        all.push(("timestamp", self.clock.now_ms().to_string()));
        let query = auth::build_signed_query(&all, &self.secret_key);
        let url = format!("{}{}?{}", self.base_url, path, query);

        debug!("[client] {method} {path}");
        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        read_body(resp).await
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Exchange time in milliseconds (`GET /api/v3/time`).
    pub async fn server_time(&self) -> Result<i64, ExchangeError> {
        let v = self.public_get("/api/v3/time", &[]).await?;
        v.get("serverTime")
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::Decode("serverTime missing".into()))
    }

    /// Measure the clock offset, store it, and widen `recvWindow` when the
    /// observed drift exceeds it. Returns the new offset.
    pub async fn sync_clock(&self) -> Result<i64, ExchangeError> {
        let mut samples = Vec::with_capacity(self.clock_samples);
        for _ in 0..self.clock_samples {
            let local_before_ms = now_ms_i64();
            let server_ms = self.server_time().await?;
            let local_after_ms = now_ms_i64();
            samples.push(ClockSample { local_before_ms, server_ms, local_after_ms });
        }
        let offset = estimate_offset(&samples)
            .ok_or_else(|| ExchangeError::Decode("no clock samples".into()))?;
        self.clock.set_offset_ms(offset);

        let current = self.recv_window_ms();
        if let Some(widened) = widened_recv_window(offset, current, self.max_recv_window_ms) {
            self.recv_window_ms.store(widened, Ordering::Relaxed);
            warn!("[client] clock drift {offset} ms exceeds recvWindow {current}, widened to {widened}");
        }
        info!("[client] clock offset {offset} ms ({} samples)", samples.len());
        Ok(offset)
    }
}

/// Run `send`; on a `-1021`, run `resync` and then `send` exactly once more.
/// A second `-1021` is returned as is.
async fn retry_on_timestamp<T, S, SF, R, RF>(path: &str, mut send: S, resync: R) -> Result<T, ExchangeError>
where
    S: FnMut() -> SF,
    SF: Future<Output = Result<T, ExchangeError>>,
    R: FnOnce() -> RF,
    RF: Future<Output = Result<i64, ExchangeError>>,
{
    match send().await {
        Err(e) if e.is_timestamp_error() => {
            warn!("[client] {path}: {e}, resyncing clock and retrying once");
            resync().await?;
            send().await
        }
        other => other,
    }
}

/// New `recvWindow` when a clock offset of `offset_ms` no longer fits in
/// `current`: the drift plus a margin, capped at `max`. `None` keeps `current`.
pub fn widened_recv_window(offset_ms: i64, current: u64, max: u64) -> Option<u64> {
    let drift = offset_ms.unsigned_abs();
    if drift <= current {
        return None;
    }
    let widened = (drift + RECV_WINDOW_MARGIN_MS).min(max);
    (widened > current).then_some(widened)
}

/// Decode a response body, mapping non-2xx statuses to [`ExchangeError`].
/// An empty 2xx body (e.g. `/api/v3/order/test`) reads as `{}`.
async fn read_body(resp: reqwest::Response) -> Result<Value, ExchangeError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ExchangeError::from_response(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(&body)?)
}
