#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use copyflow::engine::Engine;
use copyflow::execution::{
    AdapterError, AdapterRegistry, DispatcherConfig, ExecutionDispatcher, ReplicaOrder,
    RetryPolicy, RiskBook, VenueAdapter, VenueFill,
};
use copyflow::models::{
    CopyTradingSession, FollowerRelationship, MasterTradeEvent, MasterTraderProfile, OrderType,
    Side, SizingMode,
};
use copyflow::models::trader::StrategyType;
use copyflow::services::{run_aggregator, PerformanceBook};
use copyflow::store::{MemoryStore, SessionFilter, Store};

// ---------------------------------------------------------------------------
// Mock venue adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Fill the full quantity at the reference price.
    Fill,
    /// Always time out (transient class).
    Transient,
    /// Reject outright (permanent class).
    Permanent,
    /// Fill after a fixed delay.
    SlowFill { delay_ms: u64 },
}

pub struct MockAdapter {
    platform: String,
    behavior: Behavior,
    lot_step: Option<Decimal>,
    quote: Option<Decimal>,
    /// Realized P&L attributed to successive fills; zero once drained.
    pnl_script: Mutex<VecDeque<Decimal>>,
    submissions: Mutex<Vec<String>>,
    attempts: AtomicU32,
}

impl MockAdapter {
    pub fn new(platform: &str, behavior: Behavior) -> Self {
        Self {
            platform: platform.to_string(),
            behavior,
            lot_step: None,
            quote: None,
            pnl_script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn with_lot_step(mut self, step: Decimal) -> Self {
        self.lot_step = Some(step);
        self
    }

    pub fn with_quote(mut self, quote: Decimal) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_pnl_script(self, script: &[Decimal]) -> Self {
        *self.pnl_script.lock().unwrap() = script.iter().copied().collect();
        self
    }

    /// Symbols in the order the venue saw them.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueAdapter for MockAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn best_price(
        &self,
        _symbol: &str,
        _side: Side,
    ) -> Result<Option<Decimal>, AdapterError> {
        Ok(self.quote)
    }

    async fn lot_step(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        Ok(self.lot_step)
    }

    async fn submit(&self, order: &ReplicaOrder) -> Result<VenueFill, AdapterError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(order.symbol.clone());

        let fill = |pnl: Decimal| VenueFill {
            order_id: format!("mock-{}", order.session_id),
            filled_quantity: order.quantity,
            fill_price: order.reference_price.unwrap_or(Decimal::ONE),
            remaining_quantity: Decimal::ZERO,
            fees: Decimal::ZERO,
            realized_pnl: pnl,
        };

        match self.behavior {
            Behavior::Fill => {
                let pnl = self
                    .pnl_script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Decimal::ZERO);
                Ok(fill(pnl))
            }
            Behavior::Transient => Err(AdapterError::Transient("simulated venue timeout".into())),
            Behavior::Permanent => {
                Err(AdapterError::Permanent("simulated venue rejection".into()))
            }
            Behavior::SlowFill { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let pnl = self
                    .pnl_script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Decimal::ZERO);
                Ok(fill(pnl))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine fixture
// ---------------------------------------------------------------------------

pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<Engine>,
    pub risk: Arc<RiskBook>,
    pub performance: Arc<PerformanceBook>,
}

/// Fast retry policy so retry-path tests finish in tens of milliseconds.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(100),
    }
}

pub fn build_engine(adapters: Vec<Arc<dyn VenueAdapter>>, retry: RetryPolicy) -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let risk = Arc::new(RiskBook::new());
    let performance = Arc::new(PerformanceBook::new());

    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }

    let (terminal_tx, terminal_rx) = mpsc::channel(256);
    let dispatcher = Arc::new(ExecutionDispatcher::new(
        store.clone(),
        Arc::new(registry),
        risk.clone(),
        DispatcherConfig {
            per_venue_concurrency: 4,
            retry,
        },
        terminal_tx,
    ));
    let engine = Arc::new(Engine::new(store.clone(), dispatcher));

    tokio::spawn(run_aggregator(
        store.clone() as Arc<dyn Store>,
        risk.clone(),
        performance.clone(),
        terminal_rx,
    ));

    TestEngine {
        store,
        engine,
        risk,
        performance,
    }
}

// ---------------------------------------------------------------------------
// Record factories
// ---------------------------------------------------------------------------

pub async fn seed_master(store: &MemoryStore, account_size: Option<Decimal>) -> Uuid {
    let mut master = MasterTraderProfile::new("momentum-master", StrategyType::Swing);
    master.verified = true;
    master.account_size = account_size;
    let id = master.id;
    store.upsert_trader(master).await.unwrap();
    id
}

pub async fn seed_follower(
    store: &MemoryStore,
    master_id: Uuid,
    platform: &str,
    capital: i64,
    sizing: SizingMode,
) -> FollowerRelationship {
    let mut rel = FollowerRelationship::new(Uuid::new_v4(), master_id, platform);
    rel.allocated_capital = Decimal::from(capital);
    rel.sizing = sizing;
    store.insert_relationship(rel.clone()).await.unwrap();
    rel
}

pub fn trade_event(
    master_id: Uuid,
    trade_id: &str,
    symbol: &str,
    quantity: i64,
    price: Option<Decimal>,
) -> MasterTradeEvent {
    MasterTradeEvent {
        master_trade_id: trade_id.into(),
        master_id,
        platform: "master-venue".into(),
        symbol: symbol.into(),
        side: Side::Buy,
        quantity: Decimal::from(quantity),
        price,
        order_type: OrderType::Market,
        stop_loss: None,
        take_profit: None,
        leverage: None,
        executed_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Polling helpers
// ---------------------------------------------------------------------------

/// Poll until the session for (trade id, relationship) reaches a
/// terminal status, or panic after `timeout`.
pub async fn wait_terminal(
    store: &MemoryStore,
    master_trade_id: &str,
    relationship_id: Uuid,
    timeout: Duration,
) -> CopyTradingSession {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let sessions = store
            .list_sessions(&SessionFilter {
                relationship_id: Some(relationship_id),
                master_trade_id: Some(master_trade_id.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        if let Some(session) = sessions.first() {
            if session.status.is_terminal() {
                return session.clone();
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("session for {master_trade_id}/{relationship_id} not terminal within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until an arbitrary condition holds, or panic after `timeout`.
/// The probe closure should clone what it needs into an `async move`
/// block so each polled future owns its state.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if probe().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout:?}: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
