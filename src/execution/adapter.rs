use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{OrderType, Side};

/// Venue adapter failure classes. Transient errors are eligible for the
/// retry policy; permanent errors fail the session immediately even when
/// they look transient-shaped (insufficient funds, invalid order).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transient venue error: {0}")]
    Transient(String),

    #[error("permanent venue error: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

/// A sized, risk-admitted replica order ready for venue submission.
#[derive(Debug, Clone)]
pub struct ReplicaOrder {
    pub session_id: Uuid,
    pub relationship_id: Uuid,
    pub follower_id: Uuid,
    pub platform: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    /// Master's reference price; limit price for limit replicas.
    pub reference_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Option<Decimal>,
}

/// A fill reported by the venue for one submission.
#[derive(Debug, Clone)]
pub struct VenueFill {
    pub order_id: String,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub remaining_quantity: Decimal,
    pub fees: Decimal,
    /// P&L the venue attributes to this fill (closing replicas).
    pub realized_pnl: Decimal,
}

/// Order-submission boundary to one venue. Implementations own all
/// exchange connectivity; the engine only sees this trait.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn platform(&self) -> &str;

    /// Current best price on the relevant side of the book, used for the
    /// pre-submit slippage estimate. `None` when the venue exposes no
    /// quote for the symbol.
    async fn best_price(&self, symbol: &str, side: Side) -> Result<Option<Decimal>, AdapterError>;

    /// Quantity step constraint for the symbol, if the venue has one.
    async fn lot_step(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError>;

    async fn submit(&self, order: &ReplicaOrder) -> Result<VenueFill, AdapterError>;
}

/// Adapters keyed by platform name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn VenueAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters
            .insert(adapter.platform().to_string(), adapter);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(platform).cloned()
    }

    pub fn platforms(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Dry-run adapter: fills the full quantity at the reference price with
/// zero slippage and no connectivity. Used when no real adapter is wired
/// for a platform and throughout the test suite.
pub struct PaperAdapter {
    platform: String,
}

impl PaperAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl VenueAdapter for PaperAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn best_price(
        &self,
        _symbol: &str,
        _side: Side,
    ) -> Result<Option<Decimal>, AdapterError> {
        // No book to quote from.
        Ok(None)
    }

    async fn lot_step(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        Ok(None)
    }

    async fn submit(&self, order: &ReplicaOrder) -> Result<VenueFill, AdapterError> {
        let fill_price = order.reference_price.unwrap_or(Decimal::ONE);
        tracing::info!(
            platform = %self.platform,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            price = %fill_price,
            "[DRY-RUN] Filled replica order"
        );
        Ok(VenueFill {
            order_id: format!("paper-{}", order.session_id),
            filled_quantity: order.quantity,
            fill_price,
            remaining_quantity: Decimal::ZERO,
            fees: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        })
    }
}
