//! Durable order registry.
//!
//! Tracks confirmed entry orders (keyed by client token) and bracket order
//! lists (keyed by list id), plus an index of active bracket ids per symbol
//! that backs the duplicate-bracket guard.
//!
//! # File format
//!
//! One JSON document, rewritten in full on every mutation:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries":  { "<clientOrderId>": { ... } },
//!   "ocolists": { "<orderListId>":   { ... } },
//!   "activeBySymbol": { "BTCUSDT": { "activeIds": [1234], "updated": 1700000000000 } },
//!   "savedAt": 1700000000000
//! }
//! ```
//!
//! Writes go to `<path>.tmp`, are fsynced, then renamed over `<path>`, so a
//! reader only ever sees the previous or the new complete document. A file
//! that fails to parse is moved aside to `<path>.corrupt.<ms>` and the
//! registry starts empty. Unknown fields are ignored on load.
//!
//! # Locking
//!
//! All state access goes through one async mutex. Callers that need a
//! check-then-act sequence for a symbol (guard → submit → record) hold the
//! per-symbol lock from [`OrderRegistry::lock_symbol`] around it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use oco_core::time_util::now_ms;
use oco_core::{BracketGroup, EntryOrder, Leg, OrderStatus};
use oco_td::{OrderAck, OrderListAck, SpotGateway};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::RegistryError;

const FORMAT_VERSION: u32 = 1;

/// Active bracket ids for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSet {
    #[serde(default)]
    pub active_ids: Vec<u64>,
    #[serde(default)]
    pub updated: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryState {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, EntryOrder>,
    #[serde(default)]
    ocolists: BTreeMap<u64, BracketGroup>,
    #[serde(default)]
    active_by_symbol: BTreeMap<String, ActiveSet>,
    #[serde(default)]
    saved_at: u64,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl RegistryState {
    fn empty() -> Self {
        Self { version: FORMAT_VERSION, ..Default::default() }
    }

    /// Recompute the active index from the brackets themselves.
    fn rebuild_active_index(&mut self) {
        let mut rebuilt: BTreeMap<String, ActiveSet> = BTreeMap::new();
        for (id, b) in &self.ocolists {
            if b.is_active() {
                rebuilt.entry(b.symbol.clone()).or_default().active_ids.push(*id);
            }
        }
        for (symbol, set) in rebuilt.iter_mut() {
            set.updated = self.active_by_symbol.get(symbol).map(|s| s.updated).unwrap_or_default();
        }
        self.active_by_symbol = rebuilt;
    }

    fn activate(&mut self, symbol: &str, id: u64) {
        let set = self.active_by_symbol.entry(symbol.to_string()).or_default();
        if !set.active_ids.contains(&id) {
            set.active_ids.push(id);
        }
        set.updated = now_ms();
    }

    fn deactivate(&mut self, symbol: &str, id: u64) -> bool {
        let Some(set) = self.active_by_symbol.get_mut(symbol) else {
            return false;
        };
        let before = set.active_ids.len();
        set.active_ids.retain(|x| *x != id);
        let removed = set.active_ids.len() != before;
        if removed {
            set.updated = now_ms();
        }
        removed
    }

    fn has_active_bracket(&self, symbol: &str) -> bool {
        self.active_by_symbol
            .get(symbol)
            .map(|set| {
                set.active_ids
                    .iter()
                    .any(|id| self.ocolists.get(id).is_some_and(BracketGroup::is_active))
            })
            .unwrap_or(false)
    }

    fn needs_bracket(&self, symbol: &str, group_id: &str) -> bool {
        let Some(entry) = self.entries.get(group_id) else {
            return false;
        };
        if entry.status != OrderStatus::Filled {
            return false;
        }
        !self
            .ocolists
            .values()
            .any(|b| b.symbol == symbol && b.group_id == group_id && b.is_active())
    }
}

/// Result of [`OrderRegistry::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// Entries re-queried.
    pub entries: usize,
    /// Active brackets re-queried.
    pub brackets: usize,
    /// Records whose stored state changed.
    pub updated: usize,
    /// Brackets that left the active set.
    pub deactivated: usize,
    /// Queries that failed (state left as is).
    pub errors: usize,
}

/// Result of [`OrderRegistry::purge_old`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub entries: usize,
    pub brackets: usize,
}

/// Point-in-time view for status output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    pub entries: usize,
    pub brackets: usize,
    pub active_by_symbol: BTreeMap<String, Vec<u64>>,
    /// Filled entries with no live bracket, as `(symbol, clientOrderId)`.
    pub unprotected: Vec<(String, String)>,
    pub saved_at: u64,
}

// ---------------------------------------------------------------------------
// OrderRegistry
// ---------------------------------------------------------------------------

/// File-backed registry of entries and brackets.
pub struct OrderRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
    symbol_locks: Mutex<AHashMap<String, Arc<Mutex<()>>>>,
}

impl OrderRegistry {
    /// Load `path`, creating it when absent and quarantining it when corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<RegistryState>(&bytes) {
                Ok(mut st) => {
                    st.rebuild_active_index();
                    info!(
                        "[registry] loaded {}: {} entries, {} brackets",
                        path.display(),
                        st.entries.len(),
                        st.ocolists.len()
                    );
                    st
                }
                Err(e) => {
                    let aside = quarantine(&path)?;
                    warn!("[registry] {} is corrupt ({e}), moved to {}; starting empty", path.display(), aside.display());
                    let mut st = RegistryState::empty();
                    persist(&path, &mut st)?;
                    st
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut st = RegistryState::empty();
                persist(&path, &mut st)?;
                info!("[registry] created {}", path.display());
                st
            }
            Err(source) => return Err(io_err(&path, source)),
        };
        Ok(Self { path, state: Mutex::new(state), symbol_locks: Mutex::new(AHashMap::new()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-symbol lock for guard → submit → record sequences.
    pub async fn lock_symbol(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.symbol_locks.lock().await;
            locks.entry(symbol.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Upsert an entry from an order response, keyed by its client token.
    pub async fn record_entry(&self, ack: &OrderAck) -> Result<EntryOrder, RegistryError> {
        let entry = ack.to_entry()?;
        let mut st = self.state.lock().await;
        st.entries.insert(entry.client_order_id.clone(), entry.clone());
        save(&self.path, &mut st).await?;
        debug!("[registry] entry {} {} {}", entry.symbol, entry.client_order_id, entry.status);
        Ok(entry)
    }

    /// Upsert a bracket from an order-list response and mark it active.
    ///
    /// Legs already known are kept when the response carries none.
    pub async fn record_bracket(&self, ack: &OrderListAck, group_id: &str) -> Result<BracketGroup, RegistryError> {
        let mut bracket = ack.to_bracket(group_id);
        let mut st = self.state.lock().await;
        if let Some(prev) = st.ocolists.get(&bracket.order_list_id) {
            bracket.legs = merge_legs(&prev.legs, bracket.legs);
        }
        st.activate(&bracket.symbol, bracket.order_list_id);
        st.ocolists.insert(bracket.order_list_id, bracket.clone());
        save(&self.path, &mut st).await?;
        info!(
            "[registry] bracket {} listId={} group={} status={}",
            bracket.symbol,
            bracket.order_list_id,
            bracket.group_id,
            bracket.list_status_type.as_str()
        );
        Ok(bracket)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `false` while any bracket in the symbol's active set is non-terminal.
    pub async fn can_attach(&self, symbol: &str) -> bool {
        !self.state.lock().await.has_active_bracket(symbol)
    }

    /// `true` when the entry `group_id` is FILLED and has no live bracket.
    pub async fn needs_bracket(&self, symbol: &str, group_id: &str) -> bool {
        self.state.lock().await.needs_bracket(symbol, group_id)
    }

    /// Filled entries that have no live bracket.
    pub async fn unprotected_entries(&self) -> Vec<EntryOrder> {
        let st = self.state.lock().await;
        st.entries
            .values()
            .filter(|e| st.needs_bracket(&e.symbol, &e.group_id))
            .cloned()
            .collect()
    }

    pub async fn active_ids(&self, symbol: &str) -> Vec<u64> {
        self.state
            .lock()
            .await
            .active_by_symbol
            .get(symbol)
            .map(|s| s.active_ids.clone())
            .unwrap_or_default()
    }

    pub async fn entry(&self, client_order_id: &str) -> Option<EntryOrder> {
        self.state.lock().await.entries.get(client_order_id).cloned()
    }

    pub async fn bracket(&self, order_list_id: u64) -> Option<BracketGroup> {
        self.state.lock().await.ocolists.get(&order_list_id).cloned()
    }

    pub async fn summary(&self) -> RegistrySummary {
        let st = self.state.lock().await;
        let unprotected = st
            .entries
            .values()
            .filter(|e| st.needs_bracket(&e.symbol, &e.group_id))
            .map(|e| (e.symbol.clone(), e.client_order_id.clone()))
            .collect();
        RegistrySummary {
            entries: st.entries.len(),
            brackets: st.ocolists.len(),
            active_by_symbol: st
                .active_by_symbol
                .iter()
                .filter(|(_, s)| !s.active_ids.is_empty())
                .map(|(k, s)| (k.clone(), s.active_ids.clone()))
                .collect(),
            unprotected,
            saved_at: st.saved_at,
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Re-query active brackets and open entries, merge what changed.
    ///
    /// Queries run without holding the state lock; results are merged under
    /// it. The file is only rewritten when something changed.
    pub async fn reconcile(&self, gateway: &dyn SpotGateway) -> Result<ReconcileSummary, RegistryError> {
        let (bracket_ids, open_entries) = {
            let st = self.state.lock().await;
            let ids: Vec<u64> = st.active_by_symbol.values().flat_map(|s| s.active_ids.iter().copied()).collect();
            let entries: Vec<(String, u64, String)> = st
                .entries
                .values()
                .filter(|e| !e.status.is_terminal())
                .map(|e| (e.symbol.clone(), e.order_id, e.client_order_id.clone()))
                .collect();
            (ids, entries)
        };

        let mut summary = ReconcileSummary {
            entries: open_entries.len(),
            brackets: bracket_ids.len(),
            ..Default::default()
        };

        let mut list_updates = Vec::with_capacity(bracket_ids.len());
        for id in &bracket_ids {
            match gateway.query_order_list(*id).await {
                Ok(ack) => list_updates.push(ack),
                Err(e) => {
                    warn!("[registry] order list {id} query failed: {e}");
                    summary.errors += 1;
                }
            }
        }
        let mut entry_updates = Vec::with_capacity(open_entries.len());
        for (symbol, order_id, cid) in &open_entries {
            match gateway.query_order_with_fallback(symbol, Some(*order_id), cid).await {
                Ok(ack) => entry_updates.push(ack),
                Err(e) => {
                    warn!("[registry] order {symbol} {cid} query failed: {e}");
                    summary.errors += 1;
                }
            }
        }

        let mut st = self.state.lock().await;
        for ack in &list_updates {
            let Some(current) = st.ocolists.get(&ack.order_list_id) else {
                continue;
            };
            let merged = merge_bracket(current, ack);
            let symbol = merged.symbol.clone();
            let terminal = merged.is_terminal();
            if merged != *current {
                summary.updated += 1;
                st.ocolists.insert(ack.order_list_id, merged);
            }
            if terminal && st.deactivate(&symbol, ack.order_list_id) {
                summary.deactivated += 1;
                info!("[registry] bracket {symbol} listId={} done, deactivated", ack.order_list_id);
            }
        }
        for ack in &entry_updates {
            let Some(entry) = st.entries.get_mut(&ack.client_order_id) else {
                continue;
            };
            if merge_entry(entry, ack) {
                summary.updated += 1;
            }
        }

        if summary.updated > 0 || summary.deactivated > 0 {
            save(&self.path, &mut st).await?;
        }
        debug!("[registry] reconcile {summary:?}");
        Ok(summary)
    }

    /// Drop terminal or released records older than `retention`.
    pub async fn purge_old(&self, retention: Duration) -> Result<PurgeSummary, RegistryError> {
        let cutoff = now_ms().saturating_sub(retention.as_millis() as u64);
        let mut st = self.state.lock().await;

        let before_entries = st.entries.len();
        st.entries.retain(|_, e| !(e.status.is_terminal() && e.ts < cutoff));
        let before_brackets = st.ocolists.len();
        st.ocolists.retain(|_, b| b.is_active() || b.ts >= cutoff);

        let out = PurgeSummary {
            entries: before_entries - st.entries.len(),
            brackets: before_brackets - st.ocolists.len(),
        };
        if out.entries > 0 || out.brackets > 0 {
            st.rebuild_active_index();
            save(&self.path, &mut st).await?;
            info!("[registry] purged {} entries, {} brackets", out.entries, out.brackets);
        }
        Ok(out)
    }

    /// Take every live bracket of `symbol` out of the duplicate guard.
    ///
    /// The brackets are marked released in the file, so the release survives a
    /// reload. Nothing is cancelled on the exchange. Returns the released ids.
    pub async fn release_symbol(&self, symbol: &str) -> Result<Vec<u64>, RegistryError> {
        let mut st = self.state.lock().await;
        let mut released: Vec<u64> = Vec::new();
        for (id, b) in st.ocolists.iter_mut() {
            if b.symbol == symbol && b.is_active() {
                b.released = true;
                released.push(*id);
            }
        }
        let indexed = st.active_by_symbol.remove(symbol).is_some_and(|s| !s.active_ids.is_empty());
        if !released.is_empty() || indexed {
            save(&self.path, &mut st).await?;
            warn!("[registry] released {symbol} active brackets {released:?}");
        }
        Ok(released)
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Overlay `incoming` legs onto `known`, matching by order id.
fn merge_legs(known: &[Leg], incoming: Vec<Leg>) -> Vec<Leg> {
    if incoming.is_empty() {
        return known.to_vec();
    }
    let mut out = known.to_vec();
    for leg in incoming {
        match out.iter_mut().find(|l| l.order_id == leg.order_id) {
            Some(slot) => *slot = leg,
            None => out.push(leg),
        }
    }
    out
}

fn merge_bracket(current: &BracketGroup, ack: &OrderListAck) -> BracketGroup {
    let mut merged = current.clone();
    if let Some(st) = ack.list_status_type {
        merged.list_status_type = st;
    }
    if let Some(st) = ack.list_order_status {
        merged.list_order_status = st;
    }
    if ack.transaction_time > 0 {
        merged.ts = ack.transaction_time;
    }
    merged.legs = merge_legs(&current.legs, ack.legs());
    merged
}

/// Refresh status and fill figures. Returns `true` if anything changed.
fn merge_entry(entry: &mut EntryOrder, ack: &OrderAck) -> bool {
    let before = entry.clone();
    entry.status = ack.status;
    entry.executed_qty = ack.executed_qty;
    entry.cumulative_quote_qty = ack.cumulative_quote_qty;
    if !ack.price.is_zero() {
        entry.price = ack.price;
    }
    if ack.ts > 0 {
        entry.ts = ack.ts;
    }
    *entry != before
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn io_err(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::Io { path: path.display().to_string(), source }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Serialize and atomically replace `path` from async code.
///
/// The write runs on the blocking pool; callers keep the state lock across
/// it so saves land in mutation order.
async fn save(path: &Path, st: &mut RegistryState) -> Result<(), RegistryError> {
    st.saved_at = now_ms();
    let bytes = serde_json::to_vec_pretty(st)?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
        .await
        .map_err(|e| io_err(path, std::io::Error::other(e)))?
}

/// Serialize and atomically replace `path`.
fn persist(path: &Path, st: &mut RegistryState) -> Result<(), RegistryError> {
    st.saved_at = now_ms();
    let bytes = serde_json::to_vec_pretty(st)?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = with_suffix(path, ".tmp");
    {
        let mut f = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        f.write_all(bytes).map_err(|e| io_err(&tmp, e))?;
        f.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

fn quarantine(path: &Path) -> Result<PathBuf, RegistryError> {
    let aside = with_suffix(path, &format!(".corrupt.{}", now_ms()));
    fs::rename(path, &aside).map_err(|e| io_err(path, e))?;
    Ok(aside)
}
