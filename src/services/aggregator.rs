use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::execution::{RiskBook, TerminalSession};
use crate::models::{PlatformStats, SessionStatus};
use crate::store::Store;

#[derive(Debug, Default, Clone)]
struct PlatformAccumulator {
    submitted: i64,
    completed: i64,
    failed: i64,
    total_latency_ms: i64,
    latency_samples: i64,
}

/// Ratio statistics computed by the external analytics pipeline and
/// passed through the engine untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalRatios {
    pub sharpe_ratio: Option<Decimal>,
    pub profit_factor: Option<Decimal>,
}

/// Rolling per-platform execution quality plus externally supplied ratio
/// statistics, projected read-only to the analytics API.
#[derive(Default)]
pub struct PerformanceBook {
    platforms: RwLock<HashMap<String, PlatformAccumulator>>,
    external: RwLock<HashMap<Uuid, ExternalRatios>>,
}

impl PerformanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn platform_stats(&self) -> Vec<PlatformStats> {
        let platforms = self.platforms.read().await;
        let mut stats: Vec<PlatformStats> = platforms
            .iter()
            .map(|(platform, acc)| {
                let finished = acc.completed + acc.failed;
                PlatformStats {
                    platform: platform.clone(),
                    submitted: acc.submitted,
                    completed: acc.completed,
                    failed: acc.failed,
                    average_latency_ms: if acc.latency_samples > 0 {
                        acc.total_latency_ms / acc.latency_samples
                    } else {
                        0
                    },
                    success_rate: if finished > 0 {
                        Decimal::from(acc.completed) / Decimal::from(finished)
                    } else {
                        Decimal::ZERO
                    },
                }
            })
            .collect();
        stats.sort_by(|a, b| a.platform.cmp(&b.platform));
        stats
    }

    /// Pass-through ratio statistics computed outside the engine.
    pub async fn set_external_ratios(&self, relationship_id: Uuid, ratios: ExternalRatios) {
        self.external.write().await.insert(relationship_id, ratios);
    }

    pub async fn external_ratios(&self, relationship_id: Uuid) -> ExternalRatios {
        self.external
            .read()
            .await
            .get(&relationship_id)
            .copied()
            .unwrap_or_default()
    }

    async fn fold(&self, terminal: &TerminalSession) {
        let mut platforms = self.platforms.write().await;
        let acc = platforms
            .entry(terminal.session.platform.clone())
            .or_default();
        acc.submitted += 1;
        match terminal.session.status {
            SessionStatus::Completed => acc.completed += 1,
            SessionStatus::Failed => acc.failed += 1,
            _ => {}
        }
        if let Some(latency) = terminal.session.replication_delay_ms {
            acc.total_latency_ms += latency;
            acc.latency_samples += 1;
        }
    }
}

/// Fold terminal sessions into the relationship counters, the risk book
/// and the per-platform stats.
///
/// The single consumer of the terminal channel is the single writer of
/// the running counters — re-processing is additionally guarded by the
/// seen-session set so a replayed terminal session never double-counts.
pub async fn run_aggregator(
    store: Arc<dyn Store>,
    risk: Arc<RiskBook>,
    performance: Arc<PerformanceBook>,
    mut rx: mpsc::Receiver<TerminalSession>,
) {
    let mut seen: HashSet<Uuid> = HashSet::new();

    while let Some(terminal) = rx.recv().await {
        if !seen.insert(terminal.session.id) {
            tracing::debug!(
                session_id = %terminal.session.id,
                "Terminal session already aggregated — skipping"
            );
            continue;
        }

        let session = &terminal.session;
        match session.status {
            SessionStatus::Completed => {
                let pnl = terminal
                    .last_result
                    .as_ref()
                    .map(|r| r.realized_pnl)
                    .unwrap_or(Decimal::ZERO);

                if let Err(e) = store
                    .apply_session_outcome(session.relationship_id, true, pnl)
                    .await
                {
                    tracing::error!(error = %e, session_id = %session.id, "Failed to apply session outcome");
                }
                if let Some(rel) = store
                    .relationship(session.relationship_id)
                    .await
                    .ok()
                    .flatten()
                {
                    risk.apply_pnl(rel.id, rel.allocated_capital, pnl).await;
                }
            }
            SessionStatus::Failed => {
                if let Err(e) = store
                    .apply_session_outcome(session.relationship_id, false, Decimal::ZERO)
                    .await
                {
                    tracing::error!(error = %e, session_id = %session.id, "Failed to apply session outcome");
                }
            }
            // Cancelled sessions are benign no-ops; they touch no counters.
            _ => {}
        }

        performance.fold(&terminal).await;
    }

    tracing::warn!("Terminal session channel closed — aggregator shutting down");
}
