use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::risk_gate::RiskSnapshot;

#[derive(Debug, Clone)]
struct RelationshipRisk {
    day: NaiveDate,
    daily_pnl: Decimal,
    cumulative_pnl: Decimal,
    peak_equity: Decimal,
    breaker_tripped: bool,
    correlation_estimate: Decimal,
}

impl RelationshipRisk {
    fn new(day: NaiveDate, allocated_capital: Decimal) -> Self {
        Self {
            day,
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            peak_equity: allocated_capital,
            breaker_tripped: false,
            correlation_estimate: Decimal::ZERO,
        }
    }

    /// Daily P&L and the breaker reset at the day boundary; drawdown and
    /// cumulative P&L carry across days.
    fn roll_day(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.daily_pnl = Decimal::ZERO;
            self.breaker_tripped = false;
        }
    }
}

/// Live per-relationship risk state: running daily P&L, peak equity for
/// drawdown, sticky breaker flag, and the externally supplied market
/// inputs (volatility per symbol, correlation estimates).
///
/// Written by the metrics aggregator (P&L) and the dispatcher/monitor
/// (breaker); the gate only ever sees immutable snapshots.
#[derive(Default)]
pub struct RiskBook {
    relationships: RwLock<HashMap<Uuid, RelationshipRisk>>,
    volatility: RwLock<HashMap<String, Decimal>>,
}

impl RiskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(
        &self,
        relationship_id: Uuid,
        allocated_capital: Decimal,
        symbol: Option<&str>,
    ) -> RiskSnapshot {
        let today = Utc::now().date_naive();
        let mut book = self.relationships.write().await;
        let state = book
            .entry(relationship_id)
            .or_insert_with(|| RelationshipRisk::new(today, allocated_capital));
        state.roll_day(today);

        let equity = allocated_capital + state.cumulative_pnl;
        let drawdown = if state.peak_equity > Decimal::ZERO {
            ((state.peak_equity - equity) / state.peak_equity).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        let symbol_volatility = match symbol {
            Some(sym) => self.volatility.read().await.get(sym).copied(),
            None => None,
        };

        RiskSnapshot {
            daily_pnl: state.daily_pnl,
            drawdown,
            portfolio_correlation: state.correlation_estimate,
            symbol_volatility,
            breaker_tripped: state.breaker_tripped,
        }
    }

    /// Fold a terminal session's realized P&L into the running state.
    pub async fn apply_pnl(&self, relationship_id: Uuid, allocated_capital: Decimal, pnl: Decimal) {
        let today = Utc::now().date_naive();
        let mut book = self.relationships.write().await;
        let state = book
            .entry(relationship_id)
            .or_insert_with(|| RelationshipRisk::new(today, allocated_capital));
        state.roll_day(today);
        state.daily_pnl += pnl;
        state.cumulative_pnl += pnl;

        let equity = allocated_capital + state.cumulative_pnl;
        if equity > state.peak_equity {
            state.peak_equity = equity;
        }
    }

    /// Trip the sticky breaker for the current trading day.
    pub async fn trip_breaker(&self, relationship_id: Uuid, allocated_capital: Decimal) {
        let today = Utc::now().date_naive();
        let mut book = self.relationships.write().await;
        let state = book
            .entry(relationship_id)
            .or_insert_with(|| RelationshipRisk::new(today, allocated_capital));
        state.roll_day(today);
        state.breaker_tripped = true;
    }

    // --- externally supplied market inputs ---

    pub async fn set_symbol_volatility(&self, symbol: impl Into<String>, volatility: Decimal) {
        self.volatility.write().await.insert(symbol.into(), volatility);
    }

    pub async fn set_correlation_estimate(
        &self,
        relationship_id: Uuid,
        allocated_capital: Decimal,
        estimate: Decimal,
    ) {
        let today = Utc::now().date_naive();
        let mut book = self.relationships.write().await;
        let state = book
            .entry(relationship_id)
            .or_insert_with(|| RelationshipRisk::new(today, allocated_capital));
        state.correlation_estimate = estimate;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
