use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{CopyTradingSession, ExecutionResult, SessionStatus};
use crate::store::{SessionFilter, Store};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub relationship_id: Option<Uuid>,
    pub master_trade_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/sessions — session projections, filterable by relationship,
/// master trade and status.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Vec<CopyTradingSession>>, AppError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            SessionStatus::from_str(s)
                .ok_or_else(|| AppError::BadRequest(format!("unknown session status {s}")))?,
        ),
        None => None,
    };

    let sessions = state
        .store
        .list_sessions(&SessionFilter {
            relationship_id: query.relationship_id,
            master_trade_id: query.master_trade_id,
            status,
            limit: query.limit,
        })
        .await?;
    Ok(Json(sessions))
}

#[derive(Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: CopyTradingSession,
    pub results: Vec<ExecutionResult>,
}

/// GET /api/sessions/:id — one session with its execution attempts.
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, AppError> {
    let session = state
        .store
        .session(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
    let results = state.store.results_for_session(id).await?;
    Ok(Json(SessionDetail { session, results }))
}
