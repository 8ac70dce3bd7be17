use std::sync::Arc;

use metrics::gauge;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::execution::ExecutionDispatcher;
use crate::ingest::{self, SignalError};
use crate::models::{
    ConfigError, FollowerRelationship, MasterTradeEvent, RelationshipStatus, ReplicationSettings,
    RiskLimits, SizingMode, TradeSignal,
};
use crate::store::{Store, StoreError};

/// Follow-time request: the follower's capital allocation, sizing mode
/// and risk configuration for one master.
#[derive(Debug, Clone)]
pub struct FollowRequest {
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

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("master trader not found")]
    MasterNotFound,

    #[error("master is not accepting followers")]
    NotAcceptingFollowers,

    #[error("master is not verified")]
    MasterNotVerified,

    #[error("master follower cap reached ({0})")]
    FollowerCapReached(i64),

    #[error("allocated capital {offered} below master minimum {minimum}")]
    BelowMinInvestment { offered: Decimal, minimum: Decimal },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Relationship commands exposed to the dashboard, mapping 1:1 to status
/// transitions. `Unfollow` and `Stop` both land on the terminal
/// `stopped` status; unfollow is never a row deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipCommand {
    Start,
    Pause,
    Stop,
    Unfollow,
}

impl RelationshipCommand {
    pub fn target_status(self) -> RelationshipStatus {
        match self {
            RelationshipCommand::Start => RelationshipStatus::Active,
            RelationshipCommand::Pause => RelationshipStatus::Paused,
            RelationshipCommand::Stop | RelationshipCommand::Unfollow => {
                RelationshipStatus::Stopped
            }
        }
    }
}

/// Engine facade: ties the ingester and the dispatcher together behind
/// the inbound boundaries (`IngestMasterTrade`, follow, commands).
pub struct Engine {
    store: Arc<dyn Store>,
    dispatcher: Arc<ExecutionDispatcher>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<ExecutionDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// `IngestMasterTrade`: canonicalize the event and fan it out. The
    /// signal is persisted before dispatch; a replayed trade id dispatches
    /// again and is absorbed by the per-session natural key.
    pub async fn ingest_master_trade(
        &self,
        event: MasterTradeEvent,
    ) -> Result<TradeSignal, SignalError> {
        let signal = ingest::ingest(self.store.as_ref(), event).await?;
        self.dispatcher.dispatch(&signal).await?;
        Ok(signal)
    }

    /// Create a follower relationship, enforcing master-level gating and
    /// configuration ranges at follow time.
    pub async fn follow(&self, req: FollowRequest) -> Result<FollowerRelationship, FollowError> {
        let master = self
            .store
            .trader(req.master_id)
            .await?
            .ok_or(FollowError::MasterNotFound)?;

        if !master.verified {
            return Err(FollowError::MasterNotVerified);
        }
        if !master.accepting_followers {
            return Err(FollowError::NotAcceptingFollowers);
        }
        let followers = self.store.count_followers(master.id).await?;
        if followers >= master.max_followers {
            return Err(FollowError::FollowerCapReached(master.max_followers));
        }
        if req.allocated_capital < master.min_investment {
            return Err(FollowError::BelowMinInvestment {
                offered: req.allocated_capital,
                minimum: master.min_investment,
            });
        }

        let mut rel = FollowerRelationship::new(req.follower_id, req.master_id, req.platform);
        rel.allocated_capital = req.allocated_capital;
        rel.sizing = req.sizing;
        if let Some(q) = req.fixed_quantity {
            rel.fixed_quantity = q;
        }
        rel.max_position_size = req.max_position_size;
        if let Some(limits) = req.risk_limits {
            rel.risk_limits = limits;
        }
        if let Some(replication) = req.replication {
            rel.replication = replication;
        }
        rel.validate_config()?;

        self.store.insert_relationship(rel.clone()).await?;
        tracing::info!(
            relationship_id = %rel.id,
            master_id = %rel.master_id,
            capital = %rel.allocated_capital,
            sizing = %rel.sizing,
            "Follower relationship created"
        );
        Ok(rel)
    }

    /// Apply a dashboard command to a relationship through the status
    /// machine. Illegal transitions surface as `InvalidTransition`.
    pub async fn command(
        &self,
        relationship_id: Uuid,
        command: RelationshipCommand,
    ) -> Result<FollowerRelationship, StoreError> {
        let rel = self
            .store
            .transition_relationship(relationship_id, command.target_status())
            .await?;
        tracing::info!(
            relationship_id = %rel.id,
            command = ?command,
            status = %rel.status,
            "Relationship command applied"
        );
        self.refresh_active_gauge().await;
        Ok(rel)
    }

    /// Startup recovery: resolve stale open sessions to `failed` and
    /// prime the active-relationships gauge.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let recovered = self.dispatcher.recover().await?;
        self.refresh_active_gauge().await;
        Ok(recovered)
    }

    async fn refresh_active_gauge(&self) {
        if let Ok(rels) = self.store.list_relationships().await {
            let active = rels
                .iter()
                .filter(|r| r.status == RelationshipStatus::Active)
                .count();
            gauge!("active_relationships").set(active as f64);
        }
    }
}
