use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    CopyTradingSession, ExecutionResult, FollowerRelationship, MasterTraderProfile,
    RelationshipStatus, TradeSignal,
};

use super::{SessionFilter, Store, StoreError};

#[derive(Default)]
struct Inner {
    signals: HashMap<String, TradeSignal>,
    traders: HashMap<Uuid, MasterTraderProfile>,
    relationships: HashMap<Uuid, FollowerRelationship>,
    sessions: HashMap<Uuid, CopyTradingSession>,
    /// (master_trade_id, relationship_id) -> session id natural key.
    session_keys: HashMap<(String, Uuid), Uuid>,
    results: HashMap<Uuid, Vec<ExecutionResult>>,
}

/// In-memory store for tests and connectivity-free dry-run deployments.
/// A single lock serializes writers, which is plenty at dry-run scale.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_signal(&self, signal: TradeSignal) -> Result<TradeSignal, StoreError> {
        let mut inner = self.inner.write().await;
        let canonical = inner
            .signals
            .entry(signal.master_trade_id.clone())
            .or_insert(signal);
        Ok(canonical.clone())
    }

    async fn signal_by_trade_id(
        &self,
        master_trade_id: &str,
    ) -> Result<Option<TradeSignal>, StoreError> {
        Ok(self.inner.read().await.signals.get(master_trade_id).cloned())
    }

    async fn upsert_trader(&self, trader: MasterTraderProfile) -> Result<(), StoreError> {
        self.inner.write().await.traders.insert(trader.id, trader);
        Ok(())
    }

    async fn trader(&self, id: Uuid) -> Result<Option<MasterTraderProfile>, StoreError> {
        Ok(self.inner.read().await.traders.get(&id).cloned())
    }

    async fn insert_relationship(&self, rel: FollowerRelationship) -> Result<(), StoreError> {
        self.inner.write().await.relationships.insert(rel.id, rel);
        Ok(())
    }

    async fn relationship(&self, id: Uuid) -> Result<Option<FollowerRelationship>, StoreError> {
        Ok(self.inner.read().await.relationships.get(&id).cloned())
    }

    async fn relationships_for_master(
        &self,
        master_id: Uuid,
    ) -> Result<Vec<FollowerRelationship>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .relationships
            .values()
            .filter(|r| r.master_id == master_id)
            .cloned()
            .collect())
    }

    async fn list_relationships(&self) -> Result<Vec<FollowerRelationship>, StoreError> {
        Ok(self.inner.read().await.relationships.values().cloned().collect())
    }

    async fn count_followers(&self, master_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .relationships
            .values()
            .filter(|r| r.master_id == master_id && r.status != RelationshipStatus::Stopped)
            .count() as i64)
    }

    async fn transition_relationship(
        &self,
        id: Uuid,
        to: RelationshipStatus,
    ) -> Result<FollowerRelationship, StoreError> {
        let mut inner = self.inner.write().await;
        let rel = inner.relationships.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !rel.status.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                from: rel.status,
                to,
            });
        }
        rel.status = to;
        rel.updated_at = Utc::now();
        Ok(rel.clone())
    }

    async fn apply_session_outcome(
        &self,
        relationship_id: Uuid,
        success: bool,
        pnl: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let rel = inner
            .relationships
            .get_mut(&relationship_id)
            .ok_or(StoreError::NotFound)?;
        rel.total_trades += 1;
        if success {
            rel.successful_trades += 1;
        } else {
            rel.failed_trades += 1;
        }
        rel.total_pnl += pnl;
        rel.updated_at = Utc::now();
        Ok(())
    }

    async fn create_session(
        &self,
        session: CopyTradingSession,
    ) -> Result<Option<CopyTradingSession>, StoreError> {
        let mut inner = self.inner.write().await;
        let key = (session.master_trade_id.clone(), session.relationship_id);
        if inner.session_keys.contains_key(&key) {
            return Ok(None);
        }
        inner.session_keys.insert(key, session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok(Some(session))
    }

    async fn session(&self, id: Uuid) -> Result<Option<CopyTradingSession>, StoreError> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn session_exists(
        &self,
        master_trade_id: &str,
        relationship_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .session_keys
            .contains_key(&(master_trade_id.to_string(), relationship_id)))
    }

    async fn update_session(&self, session: &CopyTradingSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound);
        }
        inner.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<CopyTradingSession>, StoreError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|s| {
                filter
                    .relationship_id
                    .map_or(true, |id| s.relationship_id == id)
                    && filter
                        .master_trade_id
                        .as_deref()
                        .map_or(true, |t| s.master_trade_id == t)
                    && filter.status.map_or(true, |st| s.status == st)
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        if let Some(limit) = filter.limit {
            sessions.truncate(limit.max(0) as usize);
        }
        Ok(sessions)
    }

    async fn open_sessions(&self) -> Result<Vec<CopyTradingSession>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn append_result(&self, result: ExecutionResult) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .results
            .entry(result.session_id)
            .or_default()
            .push(result);
        Ok(())
    }

    async fn results_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ExecutionResult>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .results
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
