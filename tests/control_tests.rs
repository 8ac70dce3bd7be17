mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use copyflow::engine::{FollowError, FollowRequest, RelationshipCommand};
use copyflow::models::trader::StrategyType;
use copyflow::models::{
    CopyTradingSession, MasterTraderProfile, RelationshipStatus, SessionStatus, SizingMode,
    TradeSignal,
};
use copyflow::store::{Store, StoreError};

use common::{build_engine, fast_retry, seed_follower, seed_master, trade_event, Behavior, MockAdapter};

fn follow_request(master_id: Uuid, capital: i64) -> FollowRequest {
    FollowRequest {
        follower_id: Uuid::new_v4(),
        master_id,
        platform: "paper".into(),
        allocated_capital: Decimal::from(capital),
        sizing: SizingMode::Proportional,
        fixed_quantity: Some(Decimal::ONE),
        max_position_size: None,
        risk_limits: None,
        replication: None,
    }
}

#[tokio::test]
async fn test_follow_creates_active_relationship() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, Some(Decimal::from(100_000))).await;

    let rel = t.engine.follow(follow_request(master, 10_000)).await.unwrap();
    assert_eq!(rel.status, RelationshipStatus::Active);
    assert_eq!(rel.allocated_capital, Decimal::from(10_000));

    let stored = t.store.relationship(rel.id).await.unwrap().unwrap();
    assert_eq!(stored.id, rel.id);
}

#[tokio::test]
async fn test_follow_rejected_when_master_not_accepting() {
    let t = build_engine(vec![], fast_retry());
    let mut master = MasterTraderProfile::new("closed-master", StrategyType::Scalping);
    master.verified = true;
    master.accepting_followers = false;
    let master_id = master.id;
    t.store.upsert_trader(master).await.unwrap();

    let err = t.engine.follow(follow_request(master_id, 10_000)).await.unwrap_err();
    assert!(matches!(err, FollowError::NotAcceptingFollowers));
}

#[tokio::test]
async fn test_follow_rejected_at_follower_cap() {
    let t = build_engine(vec![], fast_retry());
    let mut master = MasterTraderProfile::new("full-master", StrategyType::Swing);
    master.verified = true;
    master.max_followers = 1;
    let master_id = master.id;
    t.store.upsert_trader(master).await.unwrap();

    t.engine.follow(follow_request(master_id, 10_000)).await.unwrap();
    let err = t.engine.follow(follow_request(master_id, 10_000)).await.unwrap_err();
    assert!(matches!(err, FollowError::FollowerCapReached(1)));
}

#[tokio::test]
async fn test_follow_rejected_below_min_investment() {
    let t = build_engine(vec![], fast_retry());
    let mut master = MasterTraderProfile::new("pricey-master", StrategyType::TrendFollowing);
    master.verified = true;
    master.min_investment = Decimal::from(50_000);
    let master_id = master.id;
    t.store.upsert_trader(master).await.unwrap();

    let err = t.engine.follow(follow_request(master_id, 10_000)).await.unwrap_err();
    assert!(matches!(err, FollowError::BelowMinInvestment { .. }));
}

#[tokio::test]
async fn test_follow_rejects_out_of_range_config() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;

    let mut req = follow_request(master, 10_000);
    req.risk_limits = Some(copyflow::models::RiskLimits {
        max_drawdown: Decimal::from(2), // > 1
        ..Default::default()
    });

    let err = t.engine.follow(req).await.unwrap_err();
    assert!(matches!(err, FollowError::Config(_)));
}

#[tokio::test]
async fn test_command_lifecycle_pause_resume_stop() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Fixed).await;

    let paused = t.engine.command(rel.id, RelationshipCommand::Pause).await.unwrap();
    assert_eq!(paused.status, RelationshipStatus::Paused);

    let resumed = t.engine.command(rel.id, RelationshipCommand::Start).await.unwrap();
    assert_eq!(resumed.status, RelationshipStatus::Active);

    let stopped = t.engine.command(rel.id, RelationshipCommand::Stop).await.unwrap();
    assert_eq!(stopped.status, RelationshipStatus::Stopped);

    // Stopped is terminal: no command brings it back.
    let err = t.engine.command(rel.id, RelationshipCommand::Start).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_unfollow_is_terminal_status_not_deletion() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Fixed).await;

    let unfollowed = t
        .engine
        .command(rel.id, RelationshipCommand::Unfollow)
        .await
        .unwrap();
    assert_eq!(unfollowed.status, RelationshipStatus::Stopped);

    // The row survives for historical sessions.
    let stored = t.store.relationship(rel.id).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_human_resume_clears_suspension() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Fixed).await;

    t.store
        .transition_relationship(rel.id, RelationshipStatus::Suspended)
        .await
        .unwrap();

    let resumed = t.engine.command(rel.id, RelationshipCommand::Start).await.unwrap();
    assert_eq!(resumed.status, RelationshipStatus::Active);
}

#[tokio::test]
async fn test_paused_relationship_receives_no_sessions() {
    let venue = Arc::new(MockAdapter::new("paper", Behavior::Fill));
    let t = build_engine(vec![venue], fast_retry());
    let master = seed_master(&t.store, Some(Decimal::from(100_000))).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Proportional).await;

    t.engine.command(rel.id, RelationshipCommand::Pause).await.unwrap();

    t.engine
        .ingest_master_trade(trade_event(master, "m1", "AAPL", 100, None))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let sessions = t
        .store
        .list_sessions(&Default::default())
        .await
        .unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_external_ratios_pass_through_unchanged() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Fixed).await;

    t.performance
        .set_external_ratios(
            rel.id,
            copyflow::services::ExternalRatios {
                sharpe_ratio: Some(Decimal::new(185, 2)),  // 1.85
                profit_factor: Some(Decimal::new(240, 2)), // 2.40
            },
        )
        .await;

    let ratios = t.performance.external_ratios(rel.id).await;
    assert_eq!(ratios.sharpe_ratio, Some(Decimal::new(185, 2)));
    assert_eq!(ratios.profit_factor, Some(Decimal::new(240, 2)));

    // Relationships without supplied ratios project empty values.
    let empty = t.performance.external_ratios(Uuid::new_v4()).await;
    assert!(empty.sharpe_ratio.is_none());
}

#[tokio::test]
async fn test_recovery_fails_stale_open_sessions() {
    let t = build_engine(vec![], fast_retry());
    let master = seed_master(&t.store, None).await;
    let rel = seed_follower(&t.store, master, "paper", 10_000, SizingMode::Fixed).await;

    // A session left pending from a previous run, well past the
    // relationship's latency budget.
    let mut event = trade_event(master, "m-stale", "AAPL", 100, None);
    event.executed_at = Utc::now() - chrono::Duration::seconds(60);
    let signal = t
        .store
        .insert_signal(TradeSignal::from_event(event))
        .await
        .unwrap();
    let session = CopyTradingSession::new(&signal, &rel);
    t.store.create_session(session.clone()).await.unwrap();

    let recovered = t.engine.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let session = t.store.session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session
        .error_message
        .as_deref()
        .unwrap()
        .contains("left unresolved"));
}
