//! # oco-engine
//!
//! Order placement and bookkeeping on top of [`oco_td::SpotGateway`]:
//!
//! - **Executor** (`executor`): validated single orders and OCO brackets
//! - **Registry** (`registry`): persisted entry/bracket state and the duplicate guard
//! - **Orchestrator** (`orchestrator`): market entry, fill wait, protective bracket
//! - **Router** (`router`): BUY/SELL signal handling with debounce
//! - **Notify** (`notify`): best-effort Slack / log notifications

pub mod error;
pub mod executor;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod router;

#[cfg(test)]
mod mock;

pub use error::{ExecError, FlowError, RegistryError};
pub use executor::{
    BracketLeg, BracketOutcome, ExecMode, OcoBuyParams, OcoSellParams, OrderExecutor, OrderOutcome,
};
pub use notify::{LogNotifier, Notifier, SlackNotifier, notifier_from_config};
pub use orchestrator::{
    BracketParams, EntryBracketOutcome, EntryRequest, FillPolicy, FillReport, Orchestrator, wait_fill,
};
pub use registry::{OrderRegistry, PurgeSummary, ReconcileSummary, RegistrySummary};
pub use router::{RouteAction, RouteOutcome, RouterConfig, SignalOverrides, SignalRouter};
