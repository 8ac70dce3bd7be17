use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{FollowRequest, RelationshipCommand};
use crate::errors::AppError;
use crate::models::{FollowerRelationship, ReplicationSettings, RiskLimits, SizingMode};
use crate::store::Store;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FollowBody {
    pub follower_id: Uuid,
    pub master_id: Uuid,
    pub platform: String,
    pub allocated_capital: Decimal,
    pub sizing: SizingMode,
    pub fixed_quantity: Option<Decimal>,
    pub max_position_size: Option<Decimal>,
    pub risk_limits: Option<RiskLimits>,
    pub replication: Option<ReplicationSettings>,
}

/// POST /api/relationships — follow a master. Master-level gating
/// (acceptance, caps, minimum investment) and configuration ranges are
/// enforced here, at follow time.
pub async fn follow(
    State(state): State<AppState>,
    Json(body): Json<FollowBody>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state
        .engine
        .follow(FollowRequest {
            follower_id: body.follower_id,
            master_id: body.master_id,
            platform: body.platform,
            allocated_capital: body.allocated_capital,
            sizing: body.sizing,
            fixed_quantity: body.fixed_quantity,
            max_position_size: body.max_position_size,
            risk_limits: body.risk_limits,
            replication: body.replication,
        })
        .await?;
    Ok(Json(rel))
}

/// GET /api/relationships
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<FollowerRelationship>>, AppError> {
    let rels = state.store.list_relationships().await?;
    Ok(Json(rels))
}

/// GET /api/relationships/:id
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state
        .store
        .relationship(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("relationship {id}")))?;
    Ok(Json(rel))
}

/// POST /api/relationships/:id/resume — `onStartCopyTrading`. Also the
/// human path out of `suspended`.
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state.engine.command(id, RelationshipCommand::Start).await?;
    Ok(Json(rel))
}

/// POST /api/relationships/:id/pause — `onPauseCopyTrading`.
pub async fn pause(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state.engine.command(id, RelationshipCommand::Pause).await?;
    Ok(Json(rel))
}

/// POST /api/relationships/:id/stop — `onStopCopyTrading`.
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state.engine.command(id, RelationshipCommand::Stop).await?;
    Ok(Json(rel))
}

/// POST /api/relationships/:id/unfollow — `onUnfollowTrader`. Terminal
/// status, never a row deletion.
pub async fn unfollow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FollowerRelationship>, AppError> {
    let rel = state
        .engine
        .command(id, RelationshipCommand::Unfollow)
        .await?;
    Ok(Json(rel))
}
