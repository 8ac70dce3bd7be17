use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{FollowerRelationship, SizingMode, TradeSignal};

/// External inputs the sizer does not derive itself: the master's nominal
/// account size (proportional denominator) and the venue's lot step.
#[derive(Debug, Clone, Default)]
pub struct SizingContext {
    pub master_account_size: Option<Decimal>,
    pub lot_step: Option<Decimal>,
}

#[derive(Debug, Error)]
pub enum SizingError {
    /// The clamped quantity rounded to zero — a benign no-op, the
    /// session is cancelled rather than failed.
    #[error("replica quantity rounded to zero")]
    Underflow,
}

/// Half of the externally supplied kelly fraction is applied to the
/// follower's capital.
const KELLY_DAMPING: Decimal = Decimal::from_parts(5, 0, 0, false, 1); // 0.5

/// Compute the replica quantity for one follower.
///
/// Clamping against `max_position_size` takes precedence over rejection:
/// an oversized replica is shrunk to the ceiling, never refused here.
pub fn compute_quantity(
    rel: &FollowerRelationship,
    signal: &TradeSignal,
    ctx: &SizingContext,
) -> Result<Decimal, SizingError> {
    let raw = match rel.sizing {
        SizingMode::Proportional => proportional_quantity(rel, signal, ctx),
        SizingMode::Fixed => rel.fixed_quantity,
        SizingMode::Kelly => kelly_quantity(rel, signal),
    };

    // The stricter of the relationship-level and risk-limit ceilings.
    let ceiling = match (rel.max_position_size, rel.risk_limits.max_position_size) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let clamped = clamp_notional(raw, ceiling, signal.price);
    let stepped = round_to_step(clamped, ctx.lot_step);

    if stepped <= Decimal::ZERO {
        return Err(SizingError::Underflow);
    }
    Ok(stepped)
}

/// Proportional: scale the master's quantity by the follower's share of
/// the master's nominal account. Falls back to the fixed unit size when
/// the master's account size is unknown.
fn proportional_quantity(
    rel: &FollowerRelationship,
    signal: &TradeSignal,
    ctx: &SizingContext,
) -> Decimal {
    match ctx.master_account_size {
        Some(size) if size > Decimal::ZERO => {
            signal.quantity * rel.allocated_capital / size
        }
        _ => rel.fixed_quantity,
    }
}

/// Kelly: half-kelly of the externally derived fraction applied to the
/// follower's capital, converted to quantity at the reference price.
/// Direction is carried by the order side; without a reference price the
/// notional cannot be converted and the fixed unit size is used.
fn kelly_quantity(rel: &FollowerRelationship, signal: &TradeSignal) -> Decimal {
    let fraction = match rel.kelly_fraction {
        Some(f) if f > Decimal::ZERO => f,
        _ => return rel.fixed_quantity,
    };
    match signal.price {
        Some(price) if price > Decimal::ZERO => {
            rel.allocated_capital * fraction * KELLY_DAMPING / price
        }
        _ => rel.fixed_quantity,
    }
}

/// Clamp the quantity so its notional stays at or below the ceiling.
/// Without a reference price the ceiling degrades to a quantity cap.
fn clamp_notional(
    quantity: Decimal,
    max_position_size: Option<Decimal>,
    reference_price: Option<Decimal>,
) -> Decimal {
    let Some(max_notional) = max_position_size else {
        return quantity;
    };
    match reference_price {
        Some(price) if price > Decimal::ZERO => {
            if quantity * price > max_notional {
                max_notional / price
            } else {
                quantity
            }
        }
        _ => quantity.min(max_notional),
    }
}

fn round_to_step(quantity: Decimal, step: Option<Decimal>) -> Decimal {
    match step {
        Some(step) if step > Decimal::ZERO => (quantity / step).floor() * step,
        _ => quantity,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MasterTradeEvent, OrderType, Side};
    use chrono::Utc;
    use uuid::Uuid;

    fn relationship(sizing: SizingMode) -> FollowerRelationship {
        let mut rel = FollowerRelationship::new(Uuid::new_v4(), Uuid::new_v4(), "paper");
        rel.allocated_capital = Decimal::from(10_000);
        rel.sizing = sizing;
        rel.fixed_quantity = Decimal::from(2);
        rel
    }

    fn signal(quantity: i64, price: Option<Decimal>) -> TradeSignal {
        TradeSignal::from_event(MasterTradeEvent {
            master_trade_id: "t-1".into(),
            master_id: Uuid::new_v4(),
            platform: "paper".into(),
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: Decimal::from(quantity),
            price,
            order_type: OrderType::Market,
            stop_loss: None,
            take_profit: None,
            leverage: None,
            executed_at: Utc::now(),
        })
    }

    #[test]
    fn test_proportional_scales_by_capital_share() {
        let rel = relationship(SizingMode::Proportional);
        let ctx = SizingContext {
            master_account_size: Some(Decimal::from(100_000)),
            lot_step: None,
        };
        // 100 * 10_000/100_000 = 10
        let qty = compute_quantity(&rel, &signal(100, None), &ctx).unwrap();
        assert_eq!(qty, Decimal::from(10));
    }

    #[test]
    fn test_proportional_falls_back_to_fixed_without_account_size() {
        let rel = relationship(SizingMode::Proportional);
        let qty = compute_quantity(&rel, &signal(100, None), &SizingContext::default()).unwrap();
        assert_eq!(qty, rel.fixed_quantity);
    }

    #[test]
    fn test_fixed_ignores_signal_magnitude() {
        let rel = relationship(SizingMode::Fixed);
        let small = compute_quantity(&rel, &signal(1, None), &SizingContext::default()).unwrap();
        let large = compute_quantity(&rel, &signal(10_000, None), &SizingContext::default()).unwrap();
        assert_eq!(small, large);
        assert_eq!(small, Decimal::from(2));
    }

    #[test]
    fn test_kelly_half_fraction_at_reference_price() {
        let mut rel = relationship(SizingMode::Kelly);
        rel.kelly_fraction = Some(Decimal::new(2, 1)); // 0.2
        // 10_000 * 0.2 * 0.5 / 50 = 20
        let qty = compute_quantity(
            &rel,
            &signal(100, Some(Decimal::from(50))),
            &SizingContext::default(),
        )
        .unwrap();
        assert_eq!(qty, Decimal::from(20));
    }

    #[test]
    fn test_notional_clamped_not_rejected() {
        let mut rel = relationship(SizingMode::Proportional);
        rel.max_position_size = Some(Decimal::from(500));
        let ctx = SizingContext {
            master_account_size: Some(Decimal::from(100_000)),
            lot_step: None,
        };
        // raw = 100 * 0.1 = 10 units at $80 = $800 notional -> clamp to $500
        let qty = compute_quantity(&rel, &signal(100, Some(Decimal::from(80))), &ctx).unwrap();
        assert_eq!(qty * Decimal::from(80), Decimal::from(500));
    }

    #[test]
    fn test_stricter_ceiling_wins() {
        let mut rel = relationship(SizingMode::Proportional);
        rel.max_position_size = Some(Decimal::from(900));
        rel.risk_limits.max_position_size = Some(Decimal::from(500));
        let ctx = SizingContext {
            master_account_size: Some(Decimal::from(100_000)),
            lot_step: None,
        };
        let qty = compute_quantity(&rel, &signal(100, Some(Decimal::from(80))), &ctx).unwrap();
        assert_eq!(qty * Decimal::from(80), Decimal::from(500));
    }

    #[test]
    fn test_lot_step_rounds_down() {
        let mut rel = relationship(SizingMode::Fixed);
        rel.fixed_quantity = Decimal::new(17, 1); // 1.7
        let ctx = SizingContext {
            master_account_size: None,
            lot_step: Some(Decimal::new(5, 1)), // 0.5
        };
        let qty = compute_quantity(&rel, &signal(1, None), &ctx).unwrap();
        assert_eq!(qty, Decimal::new(15, 1)); // 1.5
    }

    #[test]
    fn test_underflow_when_step_rounds_to_zero() {
        let mut rel = relationship(SizingMode::Fixed);
        rel.fixed_quantity = Decimal::new(3, 1); // 0.3
        let ctx = SizingContext {
            master_account_size: None,
            lot_step: Some(Decimal::ONE),
        };
        assert!(matches!(
            compute_quantity(&rel, &signal(1, None), &ctx),
            Err(SizingError::Underflow)
        ));
    }
}
