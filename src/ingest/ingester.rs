use metrics::counter;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{MasterTradeEvent, TradeSignal};
use crate::store::{Store, StoreError};

/// Rejection reasons for a raw master-trade event.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("{field} must be non-negative, got {value}")]
    NegativeField { field: &'static str, value: Decimal },

    #[error("leverage must be >= 1, got {0}")]
    LeverageBelowOne(Decimal),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turn a raw master-trade execution event into the canonical,
/// idempotent `TradeSignal`.
///
/// The canonical signal is persisted before it is handed downstream, so
/// a crash between ingestion and dispatch resumes from the stored record
/// instead of re-deriving the signal differently. Replays of a known
/// `master_trade_id` return the stored signal unchanged.
pub async fn ingest(
    store: &dyn Store,
    event: MasterTradeEvent,
) -> Result<TradeSignal, SignalError> {
    validate(&event)?;

    if let Some(existing) = store.signal_by_trade_id(&event.master_trade_id).await? {
        tracing::debug!(
            master_trade_id = %event.master_trade_id,
            "Duplicate master trade — returning canonical signal"
        );
        counter!("signals_replayed_total").increment(1);
        return Ok(existing);
    }

    // The store insert is itself idempotent on the natural key, closing
    // the race between the lookup above and a concurrent delivery.
    let canonical = store
        .insert_signal(TradeSignal::from_event(event))
        .await?;

    counter!("signals_ingested_total").increment(1);
    tracing::info!(
        master_trade_id = %canonical.master_trade_id,
        symbol = %canonical.symbol,
        side = %canonical.side,
        quantity = %canonical.quantity,
        platform = %canonical.platform,
        "Master trade ingested"
    );
    Ok(canonical)
}

fn validate(event: &MasterTradeEvent) -> Result<(), SignalError> {
    if event.master_trade_id.trim().is_empty() {
        return Err(SignalError::MissingField("master_trade_id"));
    }
    if event.symbol.trim().is_empty() {
        return Err(SignalError::MissingField("symbol"));
    }
    if event.platform.trim().is_empty() {
        return Err(SignalError::MissingField("platform"));
    }
    if event.quantity <= Decimal::ZERO {
        return Err(SignalError::NonPositiveQuantity(event.quantity));
    }
    for (field, value) in [
        ("price", event.price),
        ("stop_loss", event.stop_loss),
        ("take_profit", event.take_profit),
    ] {
        if let Some(v) = value {
            if v < Decimal::ZERO {
                return Err(SignalError::NegativeField { field, value: v });
            }
        }
    }
    if let Some(leverage) = event.leverage {
        if leverage < Decimal::ONE {
            return Err(SignalError::LeverageBelowOne(leverage));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderType, Side};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(trade_id: &str) -> MasterTradeEvent {
        MasterTradeEvent {
            master_trade_id: trade_id.into(),
            master_id: Uuid::new_v4(),
            platform: "paper".into(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: Decimal::from(100),
            price: Some(Decimal::from(50)),
            order_type: OrderType::Market,
            stop_loss: None,
            take_profit: None,
            leverage: None,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ingest_persists_canonical_signal() {
        let store = MemoryStore::new();
        let signal = ingest(&store, event("m-1")).await.unwrap();
        assert_eq!(signal.master_trade_id, "m-1");

        let stored = store.signal_by_trade_id("m-1").await.unwrap().unwrap();
        assert_eq!(stored.id, signal.id);
    }

    #[tokio::test]
    async fn test_replay_returns_same_signal() {
        let store = MemoryStore::new();
        let first = ingest(&store, event("m-1")).await.unwrap();
        let second = ingest(&store, event("m-1")).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_missing_trade_id_rejected() {
        let store = MemoryStore::new();
        let mut bad = event("");
        bad.master_trade_id = "  ".into();
        assert!(matches!(
            ingest(&store, bad).await,
            Err(SignalError::MissingField("master_trade_id"))
        ));
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let store = MemoryStore::new();
        let mut bad = event("m-2");
        bad.quantity = Decimal::ZERO;
        assert!(matches!(
            ingest(&store, bad).await,
            Err(SignalError::NonPositiveQuantity(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let store = MemoryStore::new();
        let mut bad = event("m-3");
        bad.price = Some(Decimal::from(-5));
        assert!(matches!(
            ingest(&store, bad).await,
            Err(SignalError::NegativeField { field: "price", .. })
        ));
    }
}
