use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{PerformanceMetrics, PlatformStats};
use crate::store::Store;
use crate::AppState;

#[derive(Serialize)]
pub struct PerformanceReport {
    pub relationships: Vec<PerformanceMetrics>,
    pub platforms: Vec<PlatformStats>,
}

/// GET /api/analytics/performance — per-relationship counters folded
/// into metrics, plus per-platform execution quality. Ratio statistics
/// are pass-through values supplied by the external analytics pipeline.
pub async fn performance(
    State(state): State<AppState>,
) -> Result<Json<PerformanceReport>, AppError> {
    let rels = state.store.list_relationships().await?;

    let mut relationships = Vec::with_capacity(rels.len());
    for rel in &rels {
        let ratios = state.performance.external_ratios(rel.id).await;
        relationships.push(PerformanceMetrics::from_counters(
            rel.id,
            rel.total_trades,
            rel.successful_trades,
            rel.failed_trades,
            rel.total_pnl,
            ratios.profit_factor,
            ratios.sharpe_ratio,
        ));
    }

    let platforms = state.performance.platform_stats().await;

    Ok(Json(PerformanceReport {
        relationships,
        platforms,
    }))
}
