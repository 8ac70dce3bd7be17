use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex, Semaphore};
use uuid::Uuid;

use crate::models::{
    CopyTradingSession, ExecutionResult, FollowerRelationship, RelationshipStatus, SessionStatus,
    TradeSignal,
};
use crate::store::{Store, StoreError};

use super::adapter::{AdapterRegistry, ReplicaOrder, VenueAdapter};
use super::position_sizer::{self, SizingContext, SizingError};
use super::resolver;
use super::retry::{self, RetryPolicy};
use super::risk_book::RiskBook;
use super::risk_gate::{self, ProspectiveReplica, RiskRejection};

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Concurrent submissions allowed per venue, so fan-out never
    /// overwhelms a single venue's rate limits.
    pub per_venue_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            per_venue_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// One unit of replication work handed to a relationship worker.
#[derive(Debug)]
pub struct ReplicationJob {
    pub signal: TradeSignal,
    pub session_id: Uuid,
}

/// Terminal session plus its authoritative last result, handed to the
/// metrics aggregator.
#[derive(Debug)]
pub struct TerminalSession {
    pub session: CopyTradingSession,
    pub last_result: Option<ExecutionResult>,
}

/// Everything a relationship worker needs, cheap to clone into tasks.
#[derive(Clone)]
struct WorkerCtx {
    store: Arc<dyn Store>,
    adapters: Arc<AdapterRegistry>,
    risk: Arc<RiskBook>,
    retry: RetryPolicy,
    per_venue_concurrency: usize,
    venue_permits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    terminal_tx: mpsc::Sender<TerminalSession>,
}

/// Fans one canonical signal out to per-relationship worker tasks.
///
/// Each relationship gets its own FIFO queue and worker, so replication
/// for a single follower is strictly serialized in signal-arrival order
/// while different followers proceed fully in parallel. Venue pressure
/// is bounded by a per-platform semaphore held only for the duration of
/// a submission attempt, never across a backoff sleep.
pub struct ExecutionDispatcher {
    ctx: WorkerCtx,
    workers: Mutex<HashMap<Uuid, mpsc::Sender<ReplicationJob>>>,
}

impl ExecutionDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: Arc<AdapterRegistry>,
        risk: Arc<RiskBook>,
        config: DispatcherConfig,
        terminal_tx: mpsc::Sender<TerminalSession>,
    ) -> Self {
        Self {
            ctx: WorkerCtx {
                store,
                adapters,
                risk,
                retry: config.retry,
                per_venue_concurrency: config.per_venue_concurrency,
                venue_permits: Arc::new(Mutex::new(HashMap::new())),
                terminal_tx,
            },
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve eligible relationships and enqueue one session per
    /// follower. Returns the number of sessions created.
    pub async fn dispatch(&self, signal: &TradeSignal) -> Result<usize, StoreError> {
        let eligible = resolver::eligible_relationships(self.ctx.store.as_ref(), signal).await?;
        let mut created = 0usize;

        for rel in eligible {
            let session = CopyTradingSession::new(signal, &rel);
            let Some(session) = self.ctx.store.create_session(session).await? else {
                // Lost the natural-key race to a concurrent delivery.
                continue;
            };
            counter!("sessions_created_total").increment(1);
            created += 1;

            self.enqueue(
                rel.id,
                ReplicationJob {
                    signal: signal.clone(),
                    session_id: session.id,
                },
            )
            .await;
        }

        tracing::info!(
            master_trade_id = %signal.master_trade_id,
            sessions = created,
            "Signal dispatched"
        );
        Ok(created)
    }

    async fn enqueue(&self, relationship_id: Uuid, job: ReplicationJob) {
        use std::collections::hash_map::Entry;

        let tx = {
            let mut workers = self.workers.lock().await;
            match workers.entry(relationship_id) {
                Entry::Occupied(mut entry) if entry.get().is_closed() => {
                    let (tx, rx) = mpsc::channel(256);
                    tokio::spawn(run_relationship_worker(
                        self.ctx.clone(),
                        relationship_id,
                        rx,
                    ));
                    entry.insert(tx.clone());
                    tx
                }
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let (tx, rx) = mpsc::channel(256);
                    tokio::spawn(run_relationship_worker(
                        self.ctx.clone(),
                        relationship_id,
                        rx,
                    ));
                    entry.insert(tx.clone());
                    tx
                }
            }
        };

        if tx.send(job).await.is_err() {
            tracing::error!(
                relationship_id = %relationship_id,
                "Relationship worker queue closed — job dropped"
            );
        }
    }

    /// Startup recovery: any session left `pending`/`executing` past its
    /// latency deadline is resolved to `failed` rather than silently
    /// forgotten.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let open = self.ctx.store.open_sessions().await?;
        let mut recovered = 0usize;

        for mut session in open {
            let Some(rel) = self.ctx.store.relationship(session.relationship_id).await? else {
                continue;
            };
            let Some(signal) = self
                .ctx
                .store
                .signal_by_trade_id(&session.master_trade_id)
                .await?
            else {
                continue;
            };
            let deadline = retry::session_deadline(&rel, signal.executed_at);
            if Utc::now() <= deadline {
                continue;
            }

            session.status = SessionStatus::Failed;
            session.error_message =
                Some("session left unresolved past its deadline at restart".into());
            self.ctx.store.update_session(&session).await?;
            counter!("sessions_failed_total").increment(1);
            recovered += 1;

            let _ = self
                .ctx
                .terminal_tx
                .send(TerminalSession {
                    session,
                    last_result: None,
                })
                .await;
        }

        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered stale sessions as failed");
        }
        Ok(recovered)
    }
}

async fn run_relationship_worker(
    ctx: WorkerCtx,
    relationship_id: Uuid,
    mut rx: mpsc::Receiver<ReplicationJob>,
) {
    while let Some(job) = rx.recv().await {
        if let Err(e) = process_session(&ctx, relationship_id, job).await {
            tracing::error!(
                error = %e,
                relationship_id = %relationship_id,
                "Replication session processing failed"
            );
        }
    }
    tracing::debug!(relationship_id = %relationship_id, "Relationship worker stopped");
}

async fn process_session(
    ctx: &WorkerCtx,
    relationship_id: Uuid,
    job: ReplicationJob,
) -> Result<(), StoreError> {
    let Some(mut session) = ctx.store.session(job.session_id).await? else {
        return Ok(());
    };
    if session.status.is_terminal() {
        return Ok(());
    }
    let signal = &job.signal;

    // Relationship state may have moved since resolution.
    let Some(rel) = ctx.store.relationship(relationship_id).await? else {
        return finalize(
            ctx,
            session,
            SessionStatus::Failed,
            Some("relationship record missing".into()),
            None,
        )
        .await;
    };
    if rel.status != RelationshipStatus::Active {
        return finalize(
            ctx,
            session,
            SessionStatus::Cancelled,
            Some(format!("relationship {} — replication cancelled", rel.status)),
            None,
        )
        .await;
    }

    let Some(adapter) = ctx.adapters.get(&session.platform) else {
        let msg = format!("no venue adapter registered for {}", session.platform);
        return finalize(
            ctx,
            session,
            SessionStatus::Failed,
            Some(msg),
            None,
        )
        .await;
    };

    // 1. Size the replica.
    let master_account_size = ctx
        .store
        .trader(rel.master_id)
        .await?
        .and_then(|t| t.account_size);
    let lot_step = match adapter.lot_step(&session.symbol).await {
        Ok(step) => step,
        Err(e) => {
            tracing::warn!(error = %e, symbol = %session.symbol, "Failed to fetch lot step, proceeding without");
            None
        }
    };
    let sizing_ctx = SizingContext {
        master_account_size,
        lot_step,
    };
    let quantity = match position_sizer::compute_quantity(&rel, signal, &sizing_ctx) {
        Ok(q) => q,
        Err(SizingError::Underflow) => {
            return finalize(
                ctx,
                session,
                SessionStatus::Cancelled,
                Some("replica quantity rounded to zero".into()),
                None,
            )
            .await;
        }
    };
    session.requested_quantity = Some(quantity);

    // 2. Risk gate.
    let snapshot = ctx
        .risk
        .snapshot(rel.id, rel.allocated_capital, Some(&session.symbol))
        .await;
    let replica = ProspectiveReplica {
        quantity,
        reference_price: signal.price,
        leverage: signal.leverage,
    };
    if let Err(rejection) = risk_gate::check(&replica, &rel.risk_limits, &snapshot) {
        counter!("risk_rejections_total").increment(1);
        tracing::warn!(
            relationship_id = %rel.id,
            rejection = %rejection,
            "Replica rejected by risk gate"
        );
        if rejection.trips_breaker() {
            ctx.risk.trip_breaker(rel.id, rel.allocated_capital).await;
            suspend_relationship(ctx, &rel).await;
        } else if matches!(rejection, RiskRejection::CircuitBreakerOpen) {
            suspend_relationship(ctx, &rel).await;
        }
        return finalize(
            ctx,
            session,
            SessionStatus::Failed,
            Some(rejection.to_string()),
            None,
        )
        .await;
    }

    // 3. Latency budget must still be open before touching the venue.
    let deadline = retry::session_deadline(&rel, signal.executed_at);
    if Utc::now() > deadline {
        return finalize(
            ctx,
            session,
            SessionStatus::Cancelled,
            Some("latency budget exhausted before submission".into()),
            None,
        )
        .await;
    }

    session.status = SessionStatus::Executing;
    ctx.store.update_session(&session).await?;

    // 4. Pre-submit quote check: cancel before the venue ever sees the
    // order when the estimated slippage already breaks the contract.
    if let Some(reference) = signal.price {
        match adapter.best_price(&session.symbol, session.side).await {
            Ok(Some(best)) if reference > Decimal::ZERO => {
                let estimated = ((best - reference) / reference).abs();
                let max_slippage = rel.replication.max_slippage.min(rel.risk_limits.max_slippage);
                if estimated > max_slippage {
                    return finalize(
                        ctx,
                        session,
                        SessionStatus::Cancelled,
                        Some(format!(
                            "estimated slippage {estimated} exceeds max {max_slippage}"
                        )),
                        None,
                    )
                    .await;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch quote for slippage estimate, proceeding");
            }
        }
    }

    let order = ReplicaOrder {
        session_id: session.id,
        relationship_id: rel.id,
        follower_id: rel.follower_id,
        platform: session.platform.clone(),
        symbol: session.symbol.clone(),
        side: session.side,
        quantity,
        order_type: signal.order_type,
        reference_price: signal.price,
        stop_loss: signal.stop_loss,
        take_profit: signal.take_profit,
        leverage: signal.leverage,
    };

    submit_with_retries(ctx, session, &rel, signal, adapter, order, deadline).await
}

#[allow(clippy::too_many_arguments)]
async fn submit_with_retries(
    ctx: &WorkerCtx,
    mut session: CopyTradingSession,
    rel: &FollowerRelationship,
    signal: &TradeSignal,
    adapter: Arc<dyn VenueAdapter>,
    order: ReplicaOrder,
    deadline: chrono::DateTime<Utc>,
) -> Result<(), StoreError> {
    let semaphore = venue_semaphore(ctx, &session.platform).await;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        session.retry_count = attempt.saturating_sub(1) as i32;

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                return finalize(
                    ctx,
                    session,
                    SessionStatus::Failed,
                    Some("venue worker pool closed".into()),
                    None,
                )
                .await;
            }
        };

        // Send time, measured as the order leaves for the venue.
        let delay_ms = (Utc::now() - signal.executed_at).num_milliseconds();
        let submitted = adapter.submit(&order).await;
        drop(permit);

        match submitted {
            Ok(fill) => {
                let slippage = order.reference_price.and_then(|reference| {
                    (reference > Decimal::ZERO)
                        .then(|| (fill.fill_price - reference) / reference)
                });
                let fill_quality = (order.quantity > Decimal::ZERO)
                    .then(|| fill.filled_quantity / order.quantity);

                let result = ExecutionResult {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    attempt: attempt as i32,
                    success: true,
                    order_id: Some(fill.order_id.clone()),
                    filled_quantity: fill.filled_quantity,
                    fill_price: Some(fill.fill_price),
                    remaining_quantity: fill.remaining_quantity,
                    fees: fill.fees,
                    realized_pnl: fill.realized_pnl,
                    replication_delay_ms: delay_ms,
                    slippage,
                    error_message: None,
                    executed_at: Utc::now(),
                };
                ctx.store.append_result(result.clone()).await?;

                session.replication_delay_ms = Some(delay_ms);
                session.slippage = slippage;
                session.fill_quality = fill_quality;

                if fill.remaining_quantity > Decimal::ZERO && !rel.replication.allow_partial_fills {
                    return finalize(
                        ctx,
                        session,
                        SessionStatus::Failed,
                        Some(format!(
                            "partial fill {}/{} but partial fills are disabled",
                            fill.filled_quantity, order.quantity
                        )),
                        Some(result),
                    )
                    .await;
                }

                histogram!("replication_delay_ms").record(delay_ms as f64);
                return finalize(ctx, session, SessionStatus::Completed, None, Some(result)).await;
            }
            Err(err) => {
                let result = ExecutionResult::failure(
                    session.id,
                    attempt as i32,
                    delay_ms,
                    err.to_string(),
                );
                ctx.store.append_result(result.clone()).await?;

                if !err.is_transient() {
                    return finalize(
                        ctx,
                        session,
                        SessionStatus::Failed,
                        Some(err.to_string()),
                        Some(result),
                    )
                    .await;
                }
                if !ctx.retry.attempts_left(attempt) {
                    return finalize(
                        ctx,
                        session,
                        SessionStatus::Failed,
                        Some(format!("retries exhausted: {err}")),
                        Some(result),
                    )
                    .await;
                }
                let backoff = ctx.retry.backoff(attempt);
                if retry::would_exceed_deadline(deadline, backoff) {
                    return finalize(
                        ctx,
                        session,
                        SessionStatus::Failed,
                        Some(format!(
                            "latency deadline would be exceeded before next retry: {err}"
                        )),
                        Some(result),
                    )
                    .await;
                }

                counter!("replica_retries_total").increment(1);
                tracing::debug!(
                    session_id = %session.id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Transient venue error — backing off"
                );
                tokio::time::sleep(backoff).await;

                // Cancellation boundary: the relationship may have been
                // paused/stopped/suspended while we slept.
                match ctx.store.relationship(rel.id).await? {
                    Some(current) if current.status == RelationshipStatus::Active => {}
                    Some(current) => {
                        return finalize(
                            ctx,
                            session,
                            SessionStatus::Cancelled,
                            Some(format!("relationship {} during retry", current.status)),
                            Some(result),
                        )
                        .await;
                    }
                    None => {
                        return finalize(
                            ctx,
                            session,
                            SessionStatus::Failed,
                            Some("relationship record missing".into()),
                            Some(result),
                        )
                        .await;
                    }
                }
            }
        }
    }
}

async fn venue_semaphore(ctx: &WorkerCtx, platform: &str) -> Arc<Semaphore> {
    let mut permits = ctx.venue_permits.lock().await;
    permits
        .entry(platform.to_string())
        .or_insert_with(|| Arc::new(Semaphore::new(ctx.per_venue_concurrency)))
        .clone()
}

async fn suspend_relationship(ctx: &WorkerCtx, rel: &FollowerRelationship) {
    match ctx
        .store
        .transition_relationship(rel.id, RelationshipStatus::Suspended)
        .await
    {
        Ok(_) => {
            tracing::warn!(
                relationship_id = %rel.id,
                "Relationship suspended after risk breach"
            );
        }
        Err(StoreError::InvalidTransition { from, .. }) => {
            tracing::debug!(
                relationship_id = %rel.id,
                status = %from,
                "Relationship already out of active — no suspension needed"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, relationship_id = %rel.id, "Failed to suspend relationship");
        }
    }
}

async fn finalize(
    ctx: &WorkerCtx,
    mut session: CopyTradingSession,
    status: SessionStatus,
    error: Option<String>,
    last_result: Option<ExecutionResult>,
) -> Result<(), StoreError> {
    session.status = status;
    session.error_message = error;
    session.updated_at = Utc::now();
    ctx.store.update_session(&session).await?;

    match status {
        SessionStatus::Completed => counter!("sessions_completed_total").increment(1),
        SessionStatus::Failed => counter!("sessions_failed_total").increment(1),
        SessionStatus::Cancelled => counter!("sessions_cancelled_total").increment(1),
        _ => {}
    }

    tracing::info!(
        session_id = %session.id,
        relationship_id = %session.relationship_id,
        status = %session.status,
        error = session.error_message.as_deref().unwrap_or(""),
        "Session finalized"
    );

    let _ = ctx
        .terminal_tx
        .send(TerminalSession {
            session,
            last_result,
        })
        .await;
    Ok(())
}
