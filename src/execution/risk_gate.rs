use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::RiskLimits;

/// Snapshot of a relationship's live risk state at gate time. Reads are
/// snapshot-consistent, not linearizable — slightly stale state is
/// acceptable because the gate re-evaluates on the very next signal.
#[derive(Debug, Clone, Default)]
pub struct RiskSnapshot {
    /// Realized+unrealized P&L for the current trading day (negative =
    /// loss).
    pub daily_pnl: Decimal,
    /// Drawdown from peak equity, as a fraction.
    pub drawdown: Decimal,
    /// Estimated portfolio correlation after adding this position.
    pub portfolio_correlation: Decimal,
    /// Recent volatility for the signal's symbol, when known.
    pub symbol_volatility: Option<Decimal>,
    /// Sticky breaker state for the current trading day.
    pub breaker_tripped: bool,
}

/// Policy rejections, in gate order. Never retried: retrying would
/// violate the follower's own risk configuration.
#[derive(Debug, Clone, Error)]
pub enum RiskRejection {
    #[error("circuit breaker open")]
    CircuitBreakerOpen,

    #[error("daily loss limit exceeded: loss {loss}, limit {limit}")]
    DailyLossLimitExceeded { loss: Decimal, limit: Decimal },

    #[error("drawdown limit exceeded: {drawdown} >= {limit}")]
    DrawdownLimitExceeded { drawdown: Decimal, limit: Decimal },

    #[error("leverage {requested} exceeds max {max}")]
    LeverageExceeded { requested: Decimal, max: Decimal },

    #[error("portfolio correlation {estimate} above limit {limit}")]
    CorrelationLimitExceeded { estimate: Decimal, limit: Decimal },

    #[error("symbol volatility {volatility} above limit {limit}")]
    VolatilityLimitExceeded { volatility: Decimal, limit: Decimal },
}

impl RiskRejection {
    /// Daily-loss and drawdown breaches are portfolio-level and trip the
    /// sticky breaker; the per-order rejections do not.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            RiskRejection::DailyLossLimitExceeded { .. }
                | RiskRejection::DrawdownLimitExceeded { .. }
        )
    }
}

/// The sized replica as the gate sees it.
#[derive(Debug, Clone)]
pub struct ProspectiveReplica {
    pub quantity: Decimal,
    pub reference_price: Option<Decimal>,
    pub leverage: Option<Decimal>,
}

/// Run the gate checks in order; the first failing check determines the
/// rejection reason. Passing all checks admits the order unchanged.
pub fn check(
    replica: &ProspectiveReplica,
    limits: &RiskLimits,
    snapshot: &RiskSnapshot,
) -> Result<(), RiskRejection> {
    // 1. Sticky breaker: no further checks once open.
    if limits.circuit_breaker_enabled && snapshot.breaker_tripped {
        return Err(RiskRejection::CircuitBreakerOpen);
    }

    // 2. Daily loss
    let daily_loss = -snapshot.daily_pnl;
    if daily_loss >= limits.max_daily_loss {
        return Err(RiskRejection::DailyLossLimitExceeded {
            loss: daily_loss,
            limit: limits.max_daily_loss,
        });
    }

    // 3. Drawdown
    if snapshot.drawdown >= limits.max_drawdown {
        return Err(RiskRejection::DrawdownLimitExceeded {
            drawdown: snapshot.drawdown,
            limit: limits.max_drawdown,
        });
    }

    // 4. Leverage (per-order; does not trip the breaker)
    let requested = replica.leverage.unwrap_or(Decimal::ONE);
    if requested > limits.max_leverage {
        return Err(RiskRejection::LeverageExceeded {
            requested,
            max: limits.max_leverage,
        });
    }

    // 5. Correlation
    if snapshot.portfolio_correlation > limits.correlation_limit {
        return Err(RiskRejection::CorrelationLimitExceeded {
            estimate: snapshot.portfolio_correlation,
            limit: limits.correlation_limit,
        });
    }

    // 6. Volatility
    if let Some(volatility) = snapshot.symbol_volatility {
        if volatility > limits.volatility_limit {
            return Err(RiskRejection::VolatilityLimitExceeded {
                volatility,
                limit: limits.volatility_limit,
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn replica() -> ProspectiveReplica {
        ProspectiveReplica {
            quantity: Decimal::from(10),
            reference_price: Some(Decimal::from(100)),
            leverage: None,
        }
    }

    #[test]
    fn test_clean_snapshot_passes() {
        let result = check(&replica(), &RiskLimits::default(), &RiskSnapshot::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_open_breaker_short_circuits() {
        let snapshot = RiskSnapshot {
            breaker_tripped: true,
            // Would also fail daily loss, but the breaker wins.
            daily_pnl: Decimal::from(-10_000),
            ..Default::default()
        };
        let result = check(&replica(), &RiskLimits::default(), &snapshot);
        assert!(matches!(result, Err(RiskRejection::CircuitBreakerOpen)));
    }

    #[test]
    fn test_breaker_disabled_falls_through_to_daily_loss() {
        let limits = RiskLimits {
            circuit_breaker_enabled: false,
            ..Default::default()
        };
        let snapshot = RiskSnapshot {
            breaker_tripped: true,
            daily_pnl: Decimal::from(-10_000),
            ..Default::default()
        };
        let result = check(&replica(), &limits, &snapshot);
        assert!(matches!(
            result,
            Err(RiskRejection::DailyLossLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_daily_loss_at_limit_rejects_and_trips() {
        let limits = RiskLimits {
            max_daily_loss: Decimal::from(100),
            ..Default::default()
        };
        let snapshot = RiskSnapshot {
            daily_pnl: Decimal::from(-100),
            ..Default::default()
        };
        let err = check(&replica(), &limits, &snapshot).unwrap_err();
        assert!(matches!(err, RiskRejection::DailyLossLimitExceeded { .. }));
        assert!(err.trips_breaker());
    }

    #[test]
    fn test_drawdown_rejects_and_trips() {
        let snapshot = RiskSnapshot {
            drawdown: Decimal::new(30, 2), // 0.30 >= default 0.25
            ..Default::default()
        };
        let err = check(&replica(), &RiskLimits::default(), &snapshot).unwrap_err();
        assert!(matches!(err, RiskRejection::DrawdownLimitExceeded { .. }));
        assert!(err.trips_breaker());
    }

    #[test]
    fn test_leverage_rejects_without_tripping() {
        let mut order = replica();
        order.leverage = Some(Decimal::from(10));
        let err = check(&order, &RiskLimits::default(), &RiskSnapshot::default()).unwrap_err();
        assert!(matches!(err, RiskRejection::LeverageExceeded { .. }));
        assert!(!err.trips_breaker());
    }

    #[test]
    fn test_correlation_limit() {
        let snapshot = RiskSnapshot {
            portfolio_correlation: Decimal::new(90, 2), // 0.90 > default 0.80
            ..Default::default()
        };
        let result = check(&replica(), &RiskLimits::default(), &snapshot);
        assert!(matches!(
            result,
            Err(RiskRejection::CorrelationLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_volatility_limit() {
        let snapshot = RiskSnapshot {
            symbol_volatility: Some(Decimal::new(75, 2)), // 0.75 > default 0.60
            ..Default::default()
        };
        let result = check(&replica(), &RiskLimits::default(), &snapshot);
        assert!(matches!(
            result,
            Err(RiskRejection::VolatilityLimitExceeded { .. })
        ));
    }
}
