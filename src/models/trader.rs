use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trading style declared on a master trader's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Scalping,
    Swing,
    Arbitrage,
    MeanReversion,
    TrendFollowing,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyType::Scalping => "scalping",
            StrategyType::Swing => "swing",
            StrategyType::Arbitrage => "arbitrage",
            StrategyType::MeanReversion => "mean_reversion",
            StrategyType::TrendFollowing => "trend_following",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Aggressive,
}

/// Fees the master charges followers. Collected by billing, outside the
/// engine; carried here so projections can render them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeStructure {
    pub performance_fee_pct: Decimal,
    pub management_fee_pct: Decimal,
}

/// A master trader account whose executions are replicated to followers.
///
/// Owned by the master's own trading/verification pipeline; the engine
/// reads it at follow time (caps, acceptance) and at sizing time
/// (`account_size` for proportional replicas). Performance statistics are
/// externally computed pass-through values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterTraderProfile {
    pub id: Uuid,
    pub display_name: String,
    pub strategy: StrategyType,
    pub risk_level: RiskLevel,
    pub verified: bool,
    pub fees: FeeStructure,
    pub max_followers: i64,
    pub min_investment: Decimal,
    pub accepting_followers: bool,
    /// Nominal account size used as the denominator for proportional
    /// sizing. Unknown for unverified venues.
    pub account_size: Option<Decimal>,
    /// Externally supplied statistics (win rate as a fraction, Sharpe).
    pub win_rate: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub total_pnl: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl MasterTraderProfile {
    pub fn new(display_name: impl Into<String>, strategy: StrategyType) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            strategy,
            risk_level: RiskLevel::Moderate,
            verified: false,
            fees: FeeStructure::default(),
            max_followers: 1_000,
            min_investment: Decimal::ZERO,
            accepting_followers: true,
            account_size: None,
            win_rate: None,
            sharpe_ratio: None,
            total_pnl: None,
            created_at: Utc::now(),
        }
    }
}
