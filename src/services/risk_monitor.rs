use std::sync::Arc;

use metrics::gauge;
use rust_decimal::Decimal;
use tokio::time::{interval, Duration};

use crate::execution::RiskBook;
use crate::models::{FollowerRelationship, RelationshipStatus};
use crate::store::{Store, StoreError};

/// Background risk evaluator: periodically re-checks every active
/// relationship's aggregate exposure and suspends breaches that no
/// single order triggered (cumulative small losses, slow drawdowns,
/// emergency stop-loss). This is the only path from `active` to
/// `suspended` besides a gate rejection that trips the breaker;
/// `paused`/`stopped` stay user-initiated.
pub async fn run_risk_monitor(store: Arc<dyn Store>, risk: Arc<RiskBook>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        ticker.tick().await;

        let relationships = match store.list_relationships().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Risk monitor: failed to list relationships");
                continue;
            }
        };

        let mut active = 0usize;
        for rel in &relationships {
            if rel.status != RelationshipStatus::Active {
                continue;
            }
            active += 1;

            if let Some(reason) = breach_reason(&risk, rel).await {
                tracing::warn!(
                    relationship_id = %rel.id,
                    reason = %reason,
                    "Risk monitor breach — suspending relationship"
                );
                risk.trip_breaker(rel.id, rel.allocated_capital).await;
                match store
                    .transition_relationship(rel.id, RelationshipStatus::Suspended)
                    .await
                {
                    Ok(_) => active -= 1,
                    Err(StoreError::InvalidTransition { .. }) => {}
                    Err(e) => {
                        tracing::error!(error = %e, relationship_id = %rel.id, "Failed to suspend relationship");
                    }
                }
            }
        }

        gauge!("active_relationships").set(active as f64);
    }
}

async fn breach_reason(risk: &RiskBook, rel: &FollowerRelationship) -> Option<String> {
    let snapshot = risk.snapshot(rel.id, rel.allocated_capital, None).await;
    let limits = &rel.risk_limits;

    let daily_loss = -snapshot.daily_pnl;
    if daily_loss >= limits.max_daily_loss {
        return Some(format!(
            "aggregate daily loss {daily_loss} reached limit {}",
            limits.max_daily_loss
        ));
    }
    if snapshot.drawdown >= limits.max_drawdown {
        return Some(format!(
            "drawdown {} reached limit {}",
            snapshot.drawdown, limits.max_drawdown
        ));
    }
    if limits.emergency_stop_loss > Decimal::ZERO
        && rel.total_pnl <= -limits.emergency_stop_loss
    {
        return Some(format!(
            "cumulative loss {} breached emergency stop {}",
            rel.total_pnl, limits.emergency_stop_loss
        ));
    }
    None
}
