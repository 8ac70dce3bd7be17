use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rolling execution-quality statistics for one follower venue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformStats {
    pub platform: String,
    pub submitted: i64,
    pub completed: i64,
    pub failed: i64,
    pub average_latency_ms: i64,
    /// completed / (completed + failed), as a fraction.
    pub success_rate: Decimal,
}

/// Aggregated performance projection for one relationship.
///
/// Win rate and profit factor are derived from the running counters;
/// ratio statistics (Sharpe-style) are pass-through values computed by
/// the analytics pipeline outside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub relationship_id: Uuid,
    pub total_trades: i64,
    pub successful_trades: i64,
    pub failed_trades: i64,
    pub total_pnl: Decimal,
    pub win_rate: Decimal,
    pub profit_factor: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
}

impl PerformanceMetrics {
    /// Fold the relationship counters into a projection. The ratio
    /// statistics stay whatever was externally supplied.
    pub fn from_counters(
        relationship_id: Uuid,
        total_trades: i64,
        successful_trades: i64,
        failed_trades: i64,
        total_pnl: Decimal,
        profit_factor: Option<Decimal>,
        sharpe_ratio: Option<Decimal>,
    ) -> Self {
        let win_rate = if total_trades > 0 {
            Decimal::from(successful_trades) / Decimal::from(total_trades)
        } else {
            Decimal::ZERO
        };
        Self {
            relationship_id,
            total_trades,
            successful_trades,
            failed_trades,
            total_pnl,
            win_rate,
            profit_factor,
            sharpe_ratio,
        }
    }
}
