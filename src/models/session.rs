use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{FollowerRelationship, Side, TradeSignal};

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Replication session lifecycle:
/// `pending -> executing -> {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Executing => "executing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "executing" => Some(SessionStatus::Executing),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CopyTradingSession
// ---------------------------------------------------------------------------

/// The unit of replication work: one replica lifecycle for one
/// (signal, follower relationship) pair. Exactly one session exists per
/// (`master_trade_id`, `relationship_id`) — the store enforces the
/// natural key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTradingSession {
    pub id: Uuid,
    pub master_trade_id: String,
    pub signal_id: Uuid,
    pub relationship_id: Uuid,
    /// Follower venue the replica executes on.
    pub platform: String,
    pub symbol: String,
    pub side: Side,
    /// Sized replica quantity; unset until the sizer has run.
    pub requested_quantity: Option<Decimal>,
    pub status: SessionStatus,
    /// Submit time minus master execution time.
    pub replication_delay_ms: Option<i64>,
    /// (fill price - reference price) / reference price, signed.
    pub slippage: Option<Decimal>,
    /// Filled quantity / requested quantity.
    pub fill_quality: Option<Decimal>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CopyTradingSession {
    pub fn new(signal: &TradeSignal, relationship: &FollowerRelationship) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            master_trade_id: signal.master_trade_id.clone(),
            signal_id: signal.id,
            relationship_id: relationship.id,
            platform: relationship.platform.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            requested_quantity: None,
            status: SessionStatus::Pending,
            replication_delay_ms: None,
            slippage: None,
            fill_quality: None,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Outcome of one venue submission attempt for a session. A session may
/// accumulate several results across retries; the last one is
/// authoritative for the session's final fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1-based attempt number.
    pub attempt: i32,
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_quantity: Decimal,
    pub fill_price: Option<Decimal>,
    pub remaining_quantity: Decimal,
    pub fees: Decimal,
    /// P&L attributed by the venue to this fill (closing replicas).
    pub realized_pnl: Decimal,
    pub replication_delay_ms: i64,
    pub slippage: Option<Decimal>,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn failure(session_id: Uuid, attempt: i32, delay_ms: i64, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            attempt,
            success: false,
            order_id: None,
            filled_quantity: Decimal::ZERO,
            fill_price: None,
            remaining_quantity: Decimal::ZERO,
            fees: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            replication_delay_ms: delay_ms,
            slippage: None,
            error_message: Some(error),
            executed_at: Utc::now(),
        }
    }
}
