use axum::extract::{Path, State};
use axum::Json;

use crate::errors::AppError;
use crate::models::{MasterTradeEvent, TradeSignal};
use crate::store::Store;
use crate::AppState;

/// POST /api/signals — `IngestMasterTrade`: canonicalize a raw master
/// trade and fan it out to eligible followers. Replaying a known
/// `master_trade_id` returns the stored canonical signal.
pub async fn ingest(
    State(state): State<AppState>,
    Json(event): Json<MasterTradeEvent>,
) -> Result<Json<TradeSignal>, AppError> {
    let signal = state.engine.ingest_master_trade(event).await?;
    Ok(Json(signal))
}

/// GET /api/signals/:master_trade_id — canonical signal lookup.
pub async fn detail(
    State(state): State<AppState>,
    Path(master_trade_id): Path<String>,
) -> Result<Json<TradeSignal>, AppError> {
    let signal = state
        .store
        .signal_by_trade_id(&master_trade_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("signal {master_trade_id}")))?;
    Ok(Json(signal))
}
