pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CopyTradingSession, ExecutionResult, FollowerRelationship, MasterTraderProfile,
    RelationshipStatus, SessionStatus, TradeSignal,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: RelationshipStatus,
        to: RelationshipStatus,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

/// Filter for session projections.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub relationship_id: Option<Uuid>,
    pub master_trade_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub limit: Option<i64>,
}

/// Persistence boundary of the engine: canonical signals, master
/// profiles, relationships (status + running counters), sessions and
/// execution results.
///
/// Counter updates (`apply_session_outcome`) are called only by the
/// metrics aggregator and status writes go only through
/// `transition_relationship`, which enforces the status machine —
/// the single-writer-per-key discipline lives at this seam.
#[async_trait]
pub trait Store: Send + Sync {
    // --- signals ---

    /// Idempotent insert: when `master_trade_id` was already ingested the
    /// previously stored canonical signal is returned unchanged.
    async fn insert_signal(&self, signal: TradeSignal) -> Result<TradeSignal, StoreError>;

    async fn signal_by_trade_id(
        &self,
        master_trade_id: &str,
    ) -> Result<Option<TradeSignal>, StoreError>;

    // --- master traders ---

    async fn upsert_trader(&self, trader: MasterTraderProfile) -> Result<(), StoreError>;

    async fn trader(&self, id: Uuid) -> Result<Option<MasterTraderProfile>, StoreError>;

    // --- relationships ---

    async fn insert_relationship(&self, rel: FollowerRelationship) -> Result<(), StoreError>;

    async fn relationship(&self, id: Uuid) -> Result<Option<FollowerRelationship>, StoreError>;

    async fn relationships_for_master(
        &self,
        master_id: Uuid,
    ) -> Result<Vec<FollowerRelationship>, StoreError>;

    async fn list_relationships(&self) -> Result<Vec<FollowerRelationship>, StoreError>;

    /// Count of non-stopped relationships for a master (follower cap).
    async fn count_followers(&self, master_id: Uuid) -> Result<i64, StoreError>;

    /// Status write path; validates the transition against the status
    /// machine and returns the updated record.
    async fn transition_relationship(
        &self,
        id: Uuid,
        to: RelationshipStatus,
    ) -> Result<FollowerRelationship, StoreError>;

    /// Fold one terminal session into the relationship's running
    /// counters. Single caller: the metrics aggregator.
    async fn apply_session_outcome(
        &self,
        relationship_id: Uuid,
        success: bool,
        pnl: Decimal,
    ) -> Result<(), StoreError>;

    // --- sessions ---

    /// Create a session if none exists for its
    /// (`master_trade_id`, `relationship_id`) pair. Returns `None` on a
    /// duplicate — idempotency by natural key.
    async fn create_session(
        &self,
        session: CopyTradingSession,
    ) -> Result<Option<CopyTradingSession>, StoreError>;

    async fn session(&self, id: Uuid) -> Result<Option<CopyTradingSession>, StoreError>;

    async fn session_exists(
        &self,
        master_trade_id: &str,
        relationship_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn update_session(&self, session: &CopyTradingSession) -> Result<(), StoreError>;

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<CopyTradingSession>, StoreError>;

    /// Sessions still `pending`/`executing` — the startup recovery set.
    async fn open_sessions(&self) -> Result<Vec<CopyTradingSession>, StoreError>;

    // --- execution results ---

    async fn append_result(&self, result: ExecutionResult) -> Result<(), StoreError>;

    async fn results_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ExecutionResult>, StoreError>;

    // --- health ---

    async fn ping(&self) -> Result<(), StoreError>;
}
