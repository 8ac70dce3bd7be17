use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderType, Side};

/// Raw master-trade execution event, as delivered by the master's venue
/// feed. Validated and canonicalized by the signal ingester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterTradeEvent {
    /// Natural idempotency key: one canonical signal per master trade.
    pub master_trade_id: String,
    pub master_id: Uuid,
    /// Source platform the master executed on.
    pub platform: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
}

/// Canonical, immutable replication signal. Derived exactly once per
/// `master_trade_id`; re-delivery of the same event returns this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub id: Uuid,
    pub master_trade_id: String,
    pub master_id: Uuid,
    pub platform: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Option<Decimal>,
    /// When the master's trade executed (replication delay baseline).
    pub executed_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn from_event(event: MasterTradeEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            master_trade_id: event.master_trade_id,
            master_id: event.master_id,
            platform: event.platform,
            symbol: event.symbol,
            side: event.side,
            quantity: event.quantity,
            price: event.price,
            order_type: event.order_type,
            stop_loss: event.stop_loss,
            take_profit: event.take_profit,
            leverage: event.leverage,
            executed_at: event.executed_at,
            ingested_at: Utc::now(),
        }
    }
}
