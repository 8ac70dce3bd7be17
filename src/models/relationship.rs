use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SizingMode
// ---------------------------------------------------------------------------

/// Algorithm used to translate a master's trade size into a replica size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    Proportional,
    Fixed,
    Kelly,
}

impl SizingMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "proportional" => SizingMode::Proportional,
            "kelly" => SizingMode::Kelly,
            _ => SizingMode::Fixed,
        }
    }
}

impl fmt::Display for SizingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingMode::Proportional => write!(f, "proportional"),
            SizingMode::Fixed => write!(f, "fixed"),
            SizingMode::Kelly => write!(f, "kelly"),
        }
    }
}

// ---------------------------------------------------------------------------
// RelationshipStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a follower relationship.
///
/// `paused` and `stopped` are user-initiated; `suspended` is reached only
/// through an automatic risk breach and requires a human resume. `stopped`
/// is terminal — "unfollow" is a status, never a row deletion, because
/// historical sessions keep referencing the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Active,
    Paused,
    Stopped,
    Suspended,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Paused => "paused",
            RelationshipStatus::Stopped => "stopped",
            RelationshipStatus::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RelationshipStatus::Active),
            "paused" => Some(RelationshipStatus::Paused),
            "stopped" => Some(RelationshipStatus::Stopped),
            "suspended" => Some(RelationshipStatus::Suspended),
            _ => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: RelationshipStatus) -> bool {
        use RelationshipStatus::*;
        match (self, to) {
            (Active, Paused) | (Active, Stopped) | (Active, Suspended) => true,
            (Paused, Active) | (Paused, Stopped) => true,
            // Leaving suspension is the human resume path.
            (Suspended, Active) | (Suspended, Stopped) => true,
            (Stopped, _) => false,
            _ => false,
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RiskLimits
// ---------------------------------------------------------------------------

/// Per-follower risk ceilings. Mutated only by the follower; read-only to
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max realized+unrealized loss per trading day, in account currency.
    pub max_daily_loss: Decimal,
    /// Max drawdown from peak equity, as a fraction in (0, 1].
    pub max_drawdown: Decimal,
    /// Notional ceiling per replica order, in account currency.
    pub max_position_size: Option<Decimal>,
    pub max_leverage: Decimal,
    /// Max estimated portfolio correlation after adding a position.
    pub correlation_limit: Decimal,
    /// Max tolerated recent volatility for the traded symbol.
    pub volatility_limit: Decimal,
    pub circuit_breaker_enabled: bool,
    /// Cumulative loss at which the relationship is suspended outright.
    pub emergency_stop_loss: Decimal,
    /// Max tolerated slippage as a fraction of the reference price.
    pub max_slippage: Decimal,
    /// Max replication latency before a session is abandoned.
    pub max_latency_ms: i64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::from(500),
            max_drawdown: Decimal::new(25, 2), // 0.25
            max_position_size: None,
            max_leverage: Decimal::from(5),
            correlation_limit: Decimal::new(80, 2), // 0.80
            volatility_limit: Decimal::new(60, 2),  // 0.60
            circuit_breaker_enabled: true,
            emergency_stop_loss: Decimal::from(2_000),
            max_slippage: Decimal::new(3, 2), // 0.03
            max_latency_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplicationSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Delay tolerance between master execution and replica submission.
    pub max_replication_delay_ms: i64,
    pub allow_partial_fills: bool,
    /// Max estimated slippage accepted at submit time.
    pub max_slippage: Decimal,
    /// Source platforms this follower refuses to replicate from.
    pub excluded_platforms: Vec<String>,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            max_replication_delay_ms: 5_000,
            allow_partial_fills: true,
            max_slippage: Decimal::new(3, 2), // 0.03
            excluded_platforms: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration validation
// ---------------------------------------------------------------------------

/// Rejection reasons for a follow-time configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("allocated capital must be positive, got {0}")]
    NonPositiveCapital(Decimal),

    #[error("max drawdown must be in (0, 1], got {0}")]
    DrawdownOutOfRange(Decimal),

    #[error("max leverage must be >= 1, got {0}")]
    LeverageBelowOne(Decimal),

    #[error("max daily loss must be positive, got {0}")]
    NonPositiveDailyLoss(Decimal),

    #[error("max slippage must be in [0, 1), got {0}")]
    SlippageOutOfRange(Decimal),

    #[error("latency bound must be positive, got {0}ms")]
    NonPositiveLatency(i64),

    #[error("fixed unit size must be positive when sizing is fixed, got {0}")]
    NonPositiveFixedQuantity(Decimal),
}

// ---------------------------------------------------------------------------
// FollowerRelationship
// ---------------------------------------------------------------------------

/// Links one follower account to one master trader, with the follower's
/// capital allocation, sizing mode, risk limits and running counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerRelationship {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub master_id: Uuid,
    /// Venue the follower's replicas execute on.
    pub platform: String,
    pub allocated_capital: Decimal,
    pub sizing: SizingMode,
    /// Absolute unit size for `fixed` sizing and the fallback for the
    /// other modes when their inputs are unavailable.
    pub fixed_quantity: Decimal,
    /// Externally derived kelly fraction for this relationship's history.
    pub kelly_fraction: Option<Decimal>,
    /// Notional clamp applied by the sizer (clamping, never rejection).
    pub max_position_size: Option<Decimal>,
    pub risk_limits: RiskLimits,
    pub replication: ReplicationSettings,
    pub status: RelationshipStatus,
    pub total_trades: i64,
    pub successful_trades: i64,
    pub failed_trades: i64,
    pub total_pnl: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowerRelationship {
    pub fn new(follower_id: Uuid, master_id: Uuid, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            follower_id,
            master_id,
            platform: platform.into(),
            allocated_capital: Decimal::ZERO,
            sizing: SizingMode::Fixed,
            fixed_quantity: Decimal::ONE,
            kelly_fraction: None,
            max_position_size: None,
            risk_limits: RiskLimits::default(),
            replication: ReplicationSettings::default(),
            status: RelationshipStatus::Active,
            total_trades: 0,
            successful_trades: 0,
            failed_trades: 0,
            total_pnl: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the follow-time configuration ranges before acceptance.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        if self.allocated_capital <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveCapital(self.allocated_capital));
        }
        let dd = self.risk_limits.max_drawdown;
        if dd <= Decimal::ZERO || dd > Decimal::ONE {
            return Err(ConfigError::DrawdownOutOfRange(dd));
        }
        if self.risk_limits.max_leverage < Decimal::ONE {
            return Err(ConfigError::LeverageBelowOne(self.risk_limits.max_leverage));
        }
        if self.risk_limits.max_daily_loss <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveDailyLoss(
                self.risk_limits.max_daily_loss,
            ));
        }
        for slippage in [self.risk_limits.max_slippage, self.replication.max_slippage] {
            if slippage < Decimal::ZERO || slippage >= Decimal::ONE {
                return Err(ConfigError::SlippageOutOfRange(slippage));
            }
        }
        if self.risk_limits.max_latency_ms <= 0 {
            return Err(ConfigError::NonPositiveLatency(self.risk_limits.max_latency_ms));
        }
        if self.replication.max_replication_delay_ms <= 0 {
            return Err(ConfigError::NonPositiveLatency(
                self.replication.max_replication_delay_ms,
            ));
        }
        if self.sizing == SizingMode::Fixed && self.fixed_quantity <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveFixedQuantity(self.fixed_quantity));
        }
        Ok(())
    }

    /// Replication latency budget: the stricter of the risk limit and the
    /// replication delay tolerance.
    pub fn latency_budget_ms(&self) -> i64 {
        self.risk_limits
            .max_latency_ms
            .min(self.replication.max_replication_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_relationship() -> FollowerRelationship {
        let mut rel = FollowerRelationship::new(Uuid::new_v4(), Uuid::new_v4(), "paper");
        rel.allocated_capital = Decimal::from(10_000);
        rel
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_relationship().validate_config().is_ok());
    }

    #[test]
    fn test_zero_capital_rejected() {
        let mut rel = valid_relationship();
        rel.allocated_capital = Decimal::ZERO;
        assert!(matches!(
            rel.validate_config(),
            Err(ConfigError::NonPositiveCapital(_))
        ));
    }

    #[test]
    fn test_drawdown_above_one_rejected() {
        let mut rel = valid_relationship();
        rel.risk_limits.max_drawdown = Decimal::new(15, 1); // 1.5
        assert!(matches!(
            rel.validate_config(),
            Err(ConfigError::DrawdownOutOfRange(_))
        ));
    }

    #[test]
    fn test_leverage_below_one_rejected() {
        let mut rel = valid_relationship();
        rel.risk_limits.max_leverage = Decimal::new(5, 1); // 0.5
        assert!(matches!(
            rel.validate_config(),
            Err(ConfigError::LeverageBelowOne(_))
        ));
    }

    #[test]
    fn test_status_machine() {
        use RelationshipStatus::*;
        assert!(Active.can_transition(Paused));
        assert!(Active.can_transition(Suspended));
        assert!(Paused.can_transition(Active));
        assert!(Suspended.can_transition(Active));
        assert!(!Paused.can_transition(Suspended));
        assert!(!Stopped.can_transition(Active));
        assert!(!Active.can_transition(Active));
    }

    #[test]
    fn test_latency_budget_takes_stricter_bound() {
        let mut rel = valid_relationship();
        rel.risk_limits.max_latency_ms = 2_000;
        rel.replication.max_replication_delay_ms = 800;
        assert_eq!(rel.latency_budget_ms(), 800);
    }
}
