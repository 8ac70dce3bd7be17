use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{
    relationship::{ReplicationSettings, RiskLimits},
    CopyTradingSession, ExecutionResult, FollowerRelationship, MasterTraderProfile,
    RelationshipStatus, SizingMode, TradeSignal,
};

use super::{SessionFilter, Store, StoreError};

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Postgres-backed store. Enum and config columns are stored as their
/// serde string forms so the wire, the dashboard and the database agree
/// on spellings.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the engine's tables when they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS trade_signals (
        id UUID PRIMARY KEY,
        master_trade_id TEXT NOT NULL UNIQUE,
        master_id UUID NOT NULL,
        platform TEXT NOT NULL,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        quantity NUMERIC NOT NULL,
        price NUMERIC,
        order_type TEXT NOT NULL,
        stop_loss NUMERIC,
        take_profit NUMERIC,
        leverage NUMERIC,
        executed_at TIMESTAMPTZ NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS master_traders (
        id UUID PRIMARY KEY,
        display_name TEXT NOT NULL,
        profile TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follower_relationships (
        id UUID PRIMARY KEY,
        follower_id UUID NOT NULL,
        master_id UUID NOT NULL,
        platform TEXT NOT NULL,
        allocated_capital NUMERIC NOT NULL,
        sizing TEXT NOT NULL,
        fixed_quantity NUMERIC NOT NULL,
        kelly_fraction NUMERIC,
        max_position_size NUMERIC,
        risk_limits TEXT NOT NULL,
        replication TEXT NOT NULL,
        status TEXT NOT NULL,
        total_trades BIGINT NOT NULL DEFAULT 0,
        successful_trades BIGINT NOT NULL DEFAULT 0,
        failed_trades BIGINT NOT NULL DEFAULT 0,
        total_pnl NUMERIC NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS copy_sessions (
        id UUID PRIMARY KEY,
        master_trade_id TEXT NOT NULL,
        signal_id UUID NOT NULL,
        relationship_id UUID NOT NULL,
        platform TEXT NOT NULL,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        requested_quantity NUMERIC,
        status TEXT NOT NULL,
        replication_delay_ms BIGINT,
        slippage NUMERIC,
        fill_quality NUMERIC,
        retry_count INT NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (master_trade_id, relationship_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS execution_results (
        id UUID PRIMARY KEY,
        session_id UUID NOT NULL,
        attempt INT NOT NULL,
        success BOOLEAN NOT NULL,
        order_id TEXT,
        filled_quantity NUMERIC NOT NULL,
        fill_price NUMERIC,
        remaining_quantity NUMERIC NOT NULL,
        fees NUMERIC NOT NULL,
        realized_pnl NUMERIC NOT NULL,
        replication_delay_ms BIGINT NOT NULL,
        slippage NUMERIC,
        error_message TEXT,
        executed_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

// ---------------------------------------------------------------------------
// Row types and conversions
// ---------------------------------------------------------------------------

fn enum_to_str<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value).map_err(anyhow::Error::from)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Backend(anyhow::anyhow!(
            "expected string-serializable enum, got {other}"
        ))),
    }
}

fn enum_from_str<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| StoreError::Backend(e.into()))
}

fn json_to_str<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.into()))
}

fn json_from_str<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Backend(e.into()))
}

#[derive(FromRow)]
struct SignalRow {
    id: Uuid,
    master_trade_id: String,
    master_id: Uuid,
    platform: String,
    symbol: String,
    side: String,
    quantity: Decimal,
    price: Option<Decimal>,
    order_type: String,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    leverage: Option<Decimal>,
    executed_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
}

impl SignalRow {
    fn into_model(self) -> Result<TradeSignal, StoreError> {
        Ok(TradeSignal {
            id: self.id,
            master_trade_id: self.master_trade_id,
            master_id: self.master_id,
            platform: self.platform,
            symbol: self.symbol,
            side: enum_from_str(&self.side)?,
            quantity: self.quantity,
            price: self.price,
            order_type: enum_from_str(&self.order_type)?,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            leverage: self.leverage,
            executed_at: self.executed_at,
            ingested_at: self.ingested_at,
        })
    }
}

#[derive(FromRow)]
struct RelationshipRow {
    id: Uuid,
    follower_id: Uuid,
    master_id: Uuid,
    platform: String,
    allocated_capital: Decimal,
    sizing: String,
    fixed_quantity: Decimal,
    kelly_fraction: Option<Decimal>,
    max_position_size: Option<Decimal>,
    risk_limits: String,
    replication: String,
    status: String,
    total_trades: i64,
    successful_trades: i64,
    failed_trades: i64,
    total_pnl: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RelationshipRow {
    fn into_model(self) -> Result<FollowerRelationship, StoreError> {
        let sizing: SizingMode = enum_from_str(&self.sizing)?;
        let status: RelationshipStatus = enum_from_str(&self.status)?;
        let risk_limits: RiskLimits = json_from_str(&self.risk_limits)?;
        let replication: ReplicationSettings = json_from_str(&self.replication)?;
        Ok(FollowerRelationship {
            id: self.id,
            follower_id: self.follower_id,
            master_id: self.master_id,
            platform: self.platform,
            allocated_capital: self.allocated_capital,
            sizing,
            fixed_quantity: self.fixed_quantity,
            kelly_fraction: self.kelly_fraction,
            max_position_size: self.max_position_size,
            risk_limits,
            replication,
            status,
            total_trades: self.total_trades,
            successful_trades: self.successful_trades,
            failed_trades: self.failed_trades,
            total_pnl: self.total_pnl,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    master_trade_id: String,
    signal_id: Uuid,
    relationship_id: Uuid,
    platform: String,
    symbol: String,
    side: String,
    requested_quantity: Option<Decimal>,
    status: String,
    replication_delay_ms: Option<i64>,
    slippage: Option<Decimal>,
    fill_quality: Option<Decimal>,
    retry_count: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_model(self) -> Result<CopyTradingSession, StoreError> {
        Ok(CopyTradingSession {
            id: self.id,
            master_trade_id: self.master_trade_id,
            signal_id: self.signal_id,
            relationship_id: self.relationship_id,
            platform: self.platform,
            symbol: self.symbol,
            side: enum_from_str(&self.side)?,
            requested_quantity: self.requested_quantity,
            status: enum_from_str(&self.status)?,
            replication_delay_ms: self.replication_delay_ms,
            slippage: self.slippage,
            fill_quality: self.fill_quality,
            retry_count: self.retry_count,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ResultRow {
    id: Uuid,
    session_id: Uuid,
    attempt: i32,
    success: bool,
    order_id: Option<String>,
    filled_quantity: Decimal,
    fill_price: Option<Decimal>,
    remaining_quantity: Decimal,
    fees: Decimal,
    realized_pnl: Decimal,
    replication_delay_ms: i64,
    slippage: Option<Decimal>,
    error_message: Option<String>,
    executed_at: DateTime<Utc>,
}

impl ResultRow {
    fn into_model(self) -> ExecutionResult {
        ExecutionResult {
            id: self.id,
            session_id: self.session_id,
            attempt: self.attempt,
            success: self.success,
            order_id: self.order_id,
            filled_quantity: self.filled_quantity,
            fill_price: self.fill_price,
            remaining_quantity: self.remaining_quantity,
            fees: self.fees,
            realized_pnl: self.realized_pnl,
            replication_delay_ms: self.replication_delay_ms,
            slippage: self.slippage,
            error_message: self.error_message,
            executed_at: self.executed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for PgStore {
    async fn insert_signal(&self, signal: TradeSignal) -> Result<TradeSignal, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trade_signals
                (id, master_trade_id, master_id, platform, symbol, side, quantity, price,
                 order_type, stop_loss, take_profit, leverage, executed_at, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (master_trade_id) DO NOTHING
            "#,
        )
        .bind(signal.id)
        .bind(&signal.master_trade_id)
        .bind(signal.master_id)
        .bind(&signal.platform)
        .bind(&signal.symbol)
        .bind(enum_to_str(&signal.side)?)
        .bind(signal.quantity)
        .bind(signal.price)
        .bind(enum_to_str(&signal.order_type)?)
        .bind(signal.stop_loss)
        .bind(signal.take_profit)
        .bind(signal.leverage)
        .bind(signal.executed_at)
        .bind(signal.ingested_at)
        .execute(&self.pool)
        .await?;

        // The conflict path returns the previously stored canonical row.
        self.signal_by_trade_id(&signal.master_trade_id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn signal_by_trade_id(
        &self,
        master_trade_id: &str,
    ) -> Result<Option<TradeSignal>, StoreError> {
        let row = sqlx::query_as::<_, SignalRow>(
            "SELECT * FROM trade_signals WHERE master_trade_id = $1",
        )
        .bind(master_trade_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignalRow::into_model).transpose()
    }

    async fn upsert_trader(&self, trader: MasterTraderProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO master_traders (id, display_name, profile, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET display_name = $2, profile = $3
            "#,
        )
        .bind(trader.id)
        .bind(&trader.display_name)
        .bind(json_to_str(&trader)?)
        .bind(trader.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn trader(&self, id: Uuid) -> Result<Option<MasterTraderProfile>, StoreError> {
        let profile: Option<(String,)> =
            sqlx::query_as("SELECT profile FROM master_traders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        profile.map(|(p,)| json_from_str(&p)).transpose()
    }

    async fn insert_relationship(&self, rel: FollowerRelationship) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO follower_relationships
                (id, follower_id, master_id, platform, allocated_capital, sizing,
                 fixed_quantity, kelly_fraction, max_position_size, risk_limits, replication,
                 status, total_trades, successful_trades, failed_trades, total_pnl,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(rel.id)
        .bind(rel.follower_id)
        .bind(rel.master_id)
        .bind(&rel.platform)
        .bind(rel.allocated_capital)
        .bind(enum_to_str(&rel.sizing)?)
        .bind(rel.fixed_quantity)
        .bind(rel.kelly_fraction)
        .bind(rel.max_position_size)
        .bind(json_to_str(&rel.risk_limits)?)
        .bind(json_to_str(&rel.replication)?)
        .bind(enum_to_str(&rel.status)?)
        .bind(rel.total_trades)
        .bind(rel.successful_trades)
        .bind(rel.failed_trades)
        .bind(rel.total_pnl)
        .bind(rel.created_at)
        .bind(rel.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn relationship(&self, id: Uuid) -> Result<Option<FollowerRelationship>, StoreError> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            "SELECT * FROM follower_relationships WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RelationshipRow::into_model).transpose()
    }

    async fn relationships_for_master(
        &self,
        master_id: Uuid,
    ) -> Result<Vec<FollowerRelationship>, StoreError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            "SELECT * FROM follower_relationships WHERE master_id = $1 ORDER BY created_at",
        )
        .bind(master_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RelationshipRow::into_model).collect()
    }

    async fn list_relationships(&self) -> Result<Vec<FollowerRelationship>, StoreError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            "SELECT * FROM follower_relationships ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RelationshipRow::into_model).collect()
    }

    async fn count_followers(&self, master_id: Uuid) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM follower_relationships WHERE master_id = $1 AND status <> 'stopped'",
        )
        .bind(master_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn transition_relationship(
        &self,
        id: Uuid,
        to: RelationshipStatus,
    ) -> Result<FollowerRelationship, StoreError> {
        let current = self.relationship(id).await?.ok_or(StoreError::NotFound)?;
        if !current.status.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        // Guard on the previous status so a concurrent transition loses
        // cleanly instead of overwriting.
        let updated = sqlx::query(
            "UPDATE follower_relationships SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(enum_to_str(&to)?)
        .bind(Utc::now())
        .bind(enum_to_str(&current.status)?)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        self.relationship(id).await?.ok_or(StoreError::NotFound)
    }

    async fn apply_session_outcome(
        &self,
        relationship_id: Uuid,
        success: bool,
        pnl: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE follower_relationships
            SET total_trades = total_trades + 1,
                successful_trades = successful_trades + $2,
                failed_trades = failed_trades + $3,
                total_pnl = total_pnl + $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(relationship_id)
        .bind(if success { 1i64 } else { 0i64 })
        .bind(if success { 0i64 } else { 1i64 })
        .bind(pnl)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_session(
        &self,
        session: CopyTradingSession,
    ) -> Result<Option<CopyTradingSession>, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO copy_sessions
                (id, master_trade_id, signal_id, relationship_id, platform, symbol, side,
                 requested_quantity, status, replication_delay_ms, slippage, fill_quality,
                 retry_count, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (master_trade_id, relationship_id) DO NOTHING
            "#,
        )
        .bind(session.id)
        .bind(&session.master_trade_id)
        .bind(session.signal_id)
        .bind(session.relationship_id)
        .bind(&session.platform)
        .bind(&session.symbol)
        .bind(enum_to_str(&session.side)?)
        .bind(session.requested_quantity)
        .bind(enum_to_str(&session.status)?)
        .bind(session.replication_delay_ms)
        .bind(session.slippage)
        .bind(session.fill_quality)
        .bind(session.retry_count)
        .bind(&session.error_message)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok((inserted.rows_affected() == 1).then_some(session))
    }

    async fn session(&self, id: Uuid) -> Result<Option<CopyTradingSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM copy_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRow::into_model).transpose()
    }

    async fn session_exists(
        &self,
        master_trade_id: &str,
        relationship_id: Uuid,
    ) -> Result<bool, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM copy_sessions WHERE master_trade_id = $1 AND relationship_id = $2",
        )
        .bind(master_trade_id)
        .bind(relationship_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn update_session(&self, session: &CopyTradingSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE copy_sessions
            SET requested_quantity = $2, status = $3, replication_delay_ms = $4,
                slippage = $5, fill_quality = $6, retry_count = $7, error_message = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.requested_quantity)
        .bind(enum_to_str(&session.status)?)
        .bind(session.replication_delay_ms)
        .bind(session.slippage)
        .bind(session.fill_quality)
        .bind(session.retry_count)
        .bind(&session.error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<CopyTradingSession>, StoreError> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM copy_sessions
            WHERE ($1::uuid IS NULL OR relationship_id = $1)
              AND ($2::text IS NULL OR master_trade_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at
            LIMIT $4
            "#,
        )
        .bind(filter.relationship_id)
        .bind(filter.master_trade_id.as_deref())
        .bind(status)
        .bind(filter.limit.unwrap_or(500))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_model).collect()
    }

    async fn open_sessions(&self) -> Result<Vec<CopyTradingSession>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM copy_sessions WHERE status IN ('pending', 'executing')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_model).collect()
    }

    async fn append_result(&self, result: ExecutionResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO execution_results
                (id, session_id, attempt, success, order_id, filled_quantity, fill_price,
                 remaining_quantity, fees, realized_pnl, replication_delay_ms, slippage,
                 error_message, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(result.id)
        .bind(result.session_id)
        .bind(result.attempt)
        .bind(result.success)
        .bind(&result.order_id)
        .bind(result.filled_quantity)
        .bind(result.fill_price)
        .bind(result.remaining_quantity)
        .bind(result.fees)
        .bind(result.realized_pnl)
        .bind(result.replication_delay_ms)
        .bind(result.slippage)
        .bind(&result.error_message)
        .bind(result.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn results_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ExecutionResult>, StoreError> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT * FROM execution_results WHERE session_id = $1 ORDER BY attempt",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResultRow::into_model).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
