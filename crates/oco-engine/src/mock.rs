//! Scripted in-memory gateway for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use oco_core::{
    ListOrderStatus, ListStatusType, OrderStatus, OrderType, SymbolInfo, TradingFilters,
};
use oco_td::{
    ExchangeError, ListMember, OcoLeg, OcoRequest, OrderAck, OrderListAck, OrderRef, OrderRequest,
    SpotGateway,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::notify::Notifier;

#[derive(Default)]
struct State {
    price: Decimal,
    price_script: VecDeque<Decimal>,
    balances: HashMap<String, Decimal>,
    /// Status (and executed qty, `None` = all) returned by `place_order`.
    place_fill: Option<(OrderStatus, Option<Decimal>)>,
    /// Queued `query_order` results; the last known state repeats once drained.
    query_script: VecDeque<Result<(OrderStatus, Option<Decimal>), ExchangeError>>,
    order_failures: VecDeque<ExchangeError>,
    list_failures: VecDeque<ExchangeError>,
    orders: HashMap<String, OrderAck>,
    requested: HashMap<String, Decimal>,
    lists: HashMap<u64, OrderListAck>,
    placed: Vec<OrderRequest>,
    placed_lists: Vec<OcoRequest>,
    test_orders: usize,
    queries: usize,
    next_id: u64,
}

pub struct MockGateway {
    info: SymbolInfo,
    mainnet: bool,
    state: Mutex<State>,
}

impl MockGateway {
    /// BTCUSDT at `price`: tick 0.01, step 0.00001, min notional 5.
    pub fn btc(price: Decimal) -> Self {
        let filters = TradingFilters {
            tick_size: dec!(0.01),
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            step_qty: dec!(0.00001),
            min_qty: dec!(0.00001),
            max_qty: dec!(9000),
            min_notional: dec!(5),
        };
        Self {
            info: SymbolInfo {
                symbol: "BTCUSDT".into(),
                base_asset: "BTC".into(),
                quote_asset: "USDT".into(),
                filters,
            },
            mainnet: false,
            state: Mutex::new(State { price, next_id: 1000, ..Default::default() }),
        }
    }

    pub fn mainnet(mut self) -> Self {
        self.mainnet = true;
        self
    }

    pub fn with_max_qty(mut self, max_qty: Decimal) -> Self {
        self.info.filters.max_qty = max_qty;
        self
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.set_balance(asset, amount);
        self
    }

    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        self.state.lock().unwrap().balances.insert(asset.to_string(), amount);
    }

    /// Prices returned by the next `price` calls, in order.
    pub fn script_prices(&self, prices: &[Decimal]) {
        self.state.lock().unwrap().price_script.extend(prices.iter().copied());
    }

    pub fn set_place_fill(&self, status: OrderStatus, executed: Option<Decimal>) {
        self.state.lock().unwrap().place_fill = Some((status, executed));
    }

    pub fn script_queries(&self, script: Vec<Result<(OrderStatus, Option<Decimal>), ExchangeError>>) {
        self.state.lock().unwrap().query_script.extend(script);
    }

    pub fn fail_next_orders(&self, errors: Vec<ExchangeError>) {
        self.state.lock().unwrap().order_failures.extend(errors);
    }

    pub fn fail_next_lists(&self, errors: Vec<ExchangeError>) {
        self.state.lock().unwrap().list_failures.extend(errors);
    }

    /// Move an order list to its final state, as the exchange would after a leg fills.
    pub fn finish_list(&self, order_list_id: u64) {
        let mut st = self.state.lock().unwrap();
        if let Some(list) = st.lists.get_mut(&order_list_id) {
            list.list_status_type = Some(ListStatusType::AllDone);
            list.list_order_status = Some(ListOrderStatus::AllDone);
            list.transaction_time += 1;
        }
    }

    /// Overwrite the stored status of an order.
    pub fn set_order_status(&self, client_order_id: &str, status: OrderStatus) {
        if let Some(o) = self.state.lock().unwrap().orders.get_mut(client_order_id) {
            o.status = status;
        }
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn placed_lists(&self) -> Vec<OcoRequest> {
        self.state.lock().unwrap().placed_lists.clone()
    }

    pub fn test_order_calls(&self) -> usize {
        self.state.lock().unwrap().test_orders
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().queries
    }

    fn requested_qty(req: &OrderRequest, price: Decimal) -> Decimal {
        match (&req.quantity, &req.quote_order_qty) {
            (Some(q), _) => q.parse().unwrap(),
            (None, Some(quote)) => quote.parse::<Decimal>().unwrap() / price,
            (None, None) => Decimal::ZERO,
        }
    }
}

fn fill(ack: &mut OrderAck, status: OrderStatus, executed: Decimal, price: Decimal) {
    ack.status = status;
    ack.executed_qty = executed;
    ack.cumulative_quote_qty = executed * price;
}

fn leg_ack(symbol: &str, order_id: u64, leg: &OcoLeg, ts: u64) -> OrderAck {
    OrderAck {
        symbol: symbol.to_string(),
        order_id,
        client_order_id: leg.client_order_id.clone(),
        side: None,
        order_type: Some(leg.leg_type),
        status: OrderStatus::New,
        executed_qty: Decimal::ZERO,
        cumulative_quote_qty: Decimal::ZERO,
        price: leg.price.as_deref().map(|p| p.parse().unwrap()).unwrap_or_default(),
        stop_price: leg.stop_price.as_deref().map(|p| p.parse().unwrap()).unwrap_or_default(),
        time_in_force: leg.time_in_force,
        ts,
        raw: Value::Null,
    }
}

#[async_trait]
impl SpotGateway for MockGateway {
    fn is_mainnet(&self) -> bool {
        self.mainnet
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        if symbol != self.info.symbol {
            return Err(ExchangeError::Decode(format!("unknown symbol {symbol}")));
        }
        let mut st = self.state.lock().unwrap();
        if let Some(p) = st.price_script.pop_front() {
            st.price = p;
        }
        Ok(st.price)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError> {
        if symbol != self.info.symbol {
            return Err(ExchangeError::Decode(format!("unknown symbol {symbol}")));
        }
        Ok(self.info.clone())
    }

    async fn free_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(self.state.lock().unwrap().balances.get(asset).copied().unwrap_or_default())
    }

    async fn test_order(&self, _req: &OrderRequest) -> Result<(), ExchangeError> {
        self.state.lock().unwrap().test_orders += 1;
        Ok(())
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let mut st = self.state.lock().unwrap();
        st.placed.push(req.clone());
        if let Some(e) = st.order_failures.pop_front() {
            return Err(e);
        }
        if let Some(existing) = st.orders.get(&req.client_order_id) {
            return Ok(existing.clone());
        }
        st.next_id += 1;
        let price = st.price;
        let qty = Self::requested_qty(req, price);
        let mut ack = OrderAck {
            symbol: req.symbol.clone(),
            order_id: st.next_id,
            client_order_id: req.client_order_id.clone(),
            side: Some(req.side),
            order_type: Some(req.order_type),
            status: OrderStatus::New,
            executed_qty: Decimal::ZERO,
            cumulative_quote_qty: Decimal::ZERO,
            price: req.price.as_deref().map(|p| p.parse().unwrap()).unwrap_or_default(),
            stop_price: Decimal::ZERO,
            time_in_force: req.time_in_force,
            ts: 1_700_000_000_000 + st.next_id,
            raw: Value::Null,
        };
        match st.place_fill {
            None if req.order_type == OrderType::Market => fill(&mut ack, OrderStatus::Filled, qty, price),
            None => {}
            Some((status, executed)) => fill(&mut ack, status, executed.unwrap_or(qty), price),
        }
        st.requested.insert(ack.client_order_id.clone(), qty);
        st.orders.insert(ack.client_order_id.clone(), ack.clone());
        Ok(ack)
    }

    async fn place_oco(&self, req: &OcoRequest) -> Result<OrderListAck, ExchangeError> {
        let mut st = self.state.lock().unwrap();
        st.placed_lists.push(req.clone());
        if let Some(e) = st.list_failures.pop_front() {
            return Err(e);
        }
        st.next_id += 3;
        let list_id = st.next_id;
        let ts = 1_700_000_000_000 + list_id;
        let above = leg_ack(&req.symbol, list_id + 1, &req.above, ts);
        let below = leg_ack(&req.symbol, list_id + 2, &req.below, ts);
        let ack = OrderListAck {
            order_list_id: list_id,
            list_client_order_id: req.list_client_order_id.clone(),
            symbol: req.symbol.clone(),
            list_status_type: Some(ListStatusType::ExecStarted),
            list_order_status: Some(ListOrderStatus::Executing),
            transaction_time: ts,
            orders: [&above, &below]
                .iter()
                .map(|o| ListMember {
                    symbol: o.symbol.clone(),
                    order_id: o.order_id,
                    client_order_id: o.client_order_id.clone(),
                })
                .collect(),
            order_reports: vec![above, below],
            raw: Value::Null,
        };
        st.lists.insert(list_id, ack.clone());
        Ok(ack)
    }

    async fn query_order(&self, symbol: &str, order: &OrderRef) -> Result<OrderAck, ExchangeError> {
        let mut st = self.state.lock().unwrap();
        st.queries += 1;
        let cid = match order {
            OrderRef::Client(cid) => Some(cid.clone()),
            OrderRef::Id(id) => st.orders.values().find(|o| o.order_id == *id).map(|o| o.client_order_id.clone()),
        };
        let Some(cid) = cid.filter(|c| st.orders.contains_key(c)) else {
            return Err(ExchangeError::Api { status: 400, code: -2013, msg: format!("Order does not exist ({symbol})") });
        };
        let price = st.price;
        let requested = st.requested.get(&cid).copied().unwrap_or_default();
        let scripted = st.query_script.pop_front();
        let ack = st.orders.get_mut(&cid).unwrap();
        match scripted {
            Some(Err(e)) => return Err(e),
            Some(Ok((status, executed))) => fill(ack, status, executed.unwrap_or(requested), price),
            None => {}
        }
        Ok(ack.clone())
    }

    async fn query_order_list(&self, order_list_id: u64) -> Result<OrderListAck, ExchangeError> {
        let st = self.state.lock().unwrap();
        let list = st.lists.get(&order_list_id).ok_or_else(|| ExchangeError::Api {
            status: 400,
            code: -2011,
            msg: "Order list does not exist.".into(),
        })?;
        // Queries carry no per-leg reports.
        let mut out = list.clone();
        out.order_reports.clear();
        Ok(out)
    }
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}
