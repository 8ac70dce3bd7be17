use crate::models::{FollowerRelationship, RelationshipStatus, TradeSignal};
use crate::store::{Store, StoreError};

/// Enumerate the relationships a signal fans out to: active followers of
/// the issuing master whose replication settings do not exclude the
/// signal's source platform, minus any relationship that already has a
/// session for this `master_trade_id` (second idempotency net under the
/// store's natural-key constraint).
///
/// No ranking or ordering — eligible relationships are processed
/// independently and in parallel. Master-level gating (acceptance,
/// follower caps) happened at follow time and is not re-checked here.
pub async fn eligible_relationships(
    store: &dyn Store,
    signal: &TradeSignal,
) -> Result<Vec<FollowerRelationship>, StoreError> {
    let candidates = store.relationships_for_master(signal.master_id).await?;
    let mut eligible = Vec::with_capacity(candidates.len());

    for rel in candidates {
        if rel.status != RelationshipStatus::Active {
            continue;
        }
        if rel
            .replication
            .excluded_platforms
            .iter()
            .any(|p| p == &signal.platform)
        {
            tracing::debug!(
                relationship_id = %rel.id,
                platform = %signal.platform,
                "Source platform excluded by follower settings"
            );
            continue;
        }
        if store
            .session_exists(&signal.master_trade_id, rel.id)
            .await?
        {
            tracing::debug!(
                relationship_id = %rel.id,
                master_trade_id = %signal.master_trade_id,
                "Session already exists for signal — skipping"
            );
            continue;
        }
        eligible.push(rel);
    }

    Ok(eligible)
}
