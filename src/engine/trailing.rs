//! Trailing-stop state machine.
//!
//! Pure transitions over a `Position`; all I/O (price fetch, persistence,
//! trade logging) stays with the caller. Long stops only ever ratchet
//! upward and short stops only downward, so once set the stop locks in
//! gains and never loosens.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::models::{Position, PositionStatus, PositionType};

/// Result of advancing a position against a freshly observed price.
#[derive(Debug, Clone, PartialEq)]
pub enum StopEvent {
    /// Stop level breached; the position closed at `exit_price`.
    Closed {
        exit_price: Decimal,
        pnl: Decimal,
        pnl_pct: Decimal,
    },
    /// New watermark; the stop ratcheted to `stop_price`.
    Ratcheted {
        watermark: Decimal,
        stop_price: Decimal,
    },
    /// Price stayed inside the band; nothing changed.
    Unchanged,
}

/// Advance `position` one step against `current_price`.
///
/// Closed positions and disarmed stops are no-ops. A breach closes the
/// position exactly once, stamping the exit fields.
pub fn step(position: &mut Position, current_price: Decimal, now: DateTime<Utc>) -> StopEvent {
    if position.status == PositionStatus::Closed || !position.trailing_stop_enabled {
        return StopEvent::Unchanged;
    }
    let (Some(stop_price), Some(distance)) =
        (position.trailing_stop_price, position.trailing_stop_distance)
    else {
        return StopEvent::Unchanged;
    };

    match position.position_type {
        PositionType::Long => {
            if current_price <= stop_price {
                return close(position, current_price, now);
            }
            let watermark = position.highest_price.unwrap_or(position.entry_price);
            if current_price > watermark {
                let new_stop = stop_for(PositionType::Long, current_price, distance);
                position.highest_price = Some(current_price);
                position.trailing_stop_price = Some(new_stop);
                return StopEvent::Ratcheted {
                    watermark: current_price,
                    stop_price: new_stop,
                };
            }
            StopEvent::Unchanged
        }
        PositionType::Short => {
            if current_price >= stop_price {
                return close(position, current_price, now);
            }
            let watermark = position.lowest_price.unwrap_or(position.entry_price);
            if current_price < watermark {
                let new_stop = stop_for(PositionType::Short, current_price, distance);
                position.lowest_price = Some(current_price);
                position.trailing_stop_price = Some(new_stop);
                return StopEvent::Ratcheted {
                    watermark: current_price,
                    stop_price: new_stop,
                };
            }
            StopEvent::Unchanged
        }
    }
}

fn close(position: &mut Position, exit_price: Decimal, now: DateTime<Utc>) -> StopEvent {
    let (pnl, pnl_pct) = position.pnl_at(exit_price);
    position.status = PositionStatus::Closed;
    position.exit_price = Some(exit_price);
    position.exit_date = Some(now);
    position.pnl = Some(pnl);
    position.pnl_percentage = Some(pnl_pct);
    StopEvent::Closed {
        exit_price,
        pnl,
        pnl_pct,
    }
}

/// Stop level `distance` percent away from `watermark`, on the losing side.
fn stop_for(position_type: PositionType, watermark: Decimal, distance: Decimal) -> Decimal {
    match position_type {
        PositionType::Long => watermark * (Decimal::ONE - distance / dec!(100)),
        PositionType::Short => watermark * (Decimal::ONE + distance / dec!(100)),
    }
}

/// Arm the trailing stop on an open position.
///
/// The watermark is seeded from the best of the stored extremum, the entry
/// price, and the reference price, so re-enabling resumes from the prior
/// extremum rather than resetting it.
pub fn enable(
    position: &mut Position,
    distance: Decimal,
    current_price: Decimal,
) -> Result<(), EngineError> {
    if position.status == PositionStatus::Closed {
        return Err(EngineError::PositionClosed(position.id));
    }
    if distance <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "trailing distance must be positive, got {distance}"
        )));
    }

    let watermark = match position.position_type {
        PositionType::Long => position
            .highest_price
            .unwrap_or(position.entry_price)
            .max(position.entry_price)
            .max(current_price),
        PositionType::Short => position
            .lowest_price
            .unwrap_or(position.entry_price)
            .min(position.entry_price)
            .min(current_price),
    };

    match position.position_type {
        PositionType::Long => position.highest_price = Some(watermark),
        PositionType::Short => position.lowest_price = Some(watermark),
    }
    position.trailing_stop_enabled = true;
    position.trailing_stop_distance = Some(distance);
    position.trailing_stop_price = Some(stop_for(position.position_type, watermark, distance));
    Ok(())
}

/// Disarm the trailing stop. Watermarks are kept so a later enable resumes
/// from the prior extremum.
pub fn disable(position: &mut Position) -> Result<(), EngineError> {
    if position.status == PositionStatus::Closed {
        return Err(EngineError::PositionClosed(position.id));
    }
    position.trailing_stop_enabled = false;
    position.trailing_stop_distance = None;
    position.trailing_stop_price = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position(entry: Decimal) -> Position {
        Position::new("BTCUSDT".to_string(), PositionType::Long, entry, dec!(2))
    }

    fn short_position(entry: Decimal) -> Position {
        Position::new("BTCUSDT".to_string(), PositionType::Short, entry, dec!(2))
    }

    #[test]
    fn test_long_ratchet_then_close() {
        // entry 100, distance 5%; 100 -> 110 -> 104
        let mut pos = long_position(dec!(100));
        enable(&mut pos, dec!(5), dec!(100)).unwrap();
        assert_eq!(pos.trailing_stop_price, Some(dec!(95)));

        let event = step(&mut pos, dec!(110), Utc::now());
        assert_eq!(
            event,
            StopEvent::Ratcheted {
                watermark: dec!(110),
                stop_price: dec!(104.5),
            }
        );
        assert_eq!(pos.highest_price, Some(dec!(110)));

        let event = step(&mut pos, dec!(104), Utc::now());
        let StopEvent::Closed {
            exit_price, pnl, ..
        } = event
        else {
            panic!("expected close, got {event:?}");
        };
        assert_eq!(exit_price, dec!(104));
        assert_eq!(pnl, dec!(8)); // (104 - 100) * 2
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.exit_price, Some(dec!(104)));
    }

    #[test]
    fn test_long_stop_never_loosens() {
        let mut pos = long_position(dec!(100));
        enable(&mut pos, dec!(5), dec!(100)).unwrap();

        // Rising prices ratchet the stop up
        let mut last_stop = pos.trailing_stop_price.unwrap();
        for price in [dec!(102), dec!(105), dec!(108)] {
            step(&mut pos, price, Utc::now());
            let stop = pos.trailing_stop_price.unwrap();
            assert!(stop >= last_stop);
            last_stop = stop;
        }

        // A pullback that stays above the stop changes nothing
        assert_eq!(step(&mut pos, dec!(106), Utc::now()), StopEvent::Unchanged);
        assert_eq!(pos.trailing_stop_price, Some(last_stop));
        assert_eq!(pos.highest_price, Some(dec!(108)));
    }

    #[test]
    fn test_short_mirror() {
        // entry 100, distance 5%; 90 ratchets stop down to 94.5, 95 closes
        let mut pos = short_position(dec!(100));
        enable(&mut pos, dec!(5), dec!(100)).unwrap();
        assert_eq!(pos.trailing_stop_price, Some(dec!(105)));

        let event = step(&mut pos, dec!(90), Utc::now());
        assert_eq!(
            event,
            StopEvent::Ratcheted {
                watermark: dec!(90),
                stop_price: dec!(94.5),
            }
        );

        let event = step(&mut pos, dec!(95), Utc::now());
        let StopEvent::Closed { pnl, pnl_pct, .. } = event else {
            panic!("expected close, got {event:?}");
        };
        assert_eq!(pnl, dec!(10)); // (100 - 95) * 2
        assert_eq!(pnl_pct, dec!(5));
    }

    #[test]
    fn test_disarmed_is_noop() {
        let mut pos = long_position(dec!(100));
        assert_eq!(step(&mut pos, dec!(1), Utc::now()), StopEvent::Unchanged);
        assert_eq!(pos.status, PositionStatus::Active);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut pos = long_position(dec!(100));
        enable(&mut pos, dec!(5), dec!(100)).unwrap();
        step(&mut pos, dec!(90), Utc::now());
        assert_eq!(pos.status, PositionStatus::Closed);
        let first_exit = pos.exit_price;

        // Further steps must not touch the exit fields
        assert_eq!(step(&mut pos, dec!(50), Utc::now()), StopEvent::Unchanged);
        assert_eq!(pos.exit_price, first_exit);
    }

    #[test]
    fn test_enable_on_closed_fails() {
        let mut pos = long_position(dec!(100));
        pos.status = PositionStatus::Closed;
        assert!(matches!(
            enable(&mut pos, dec!(5), dec!(100)),
            Err(EngineError::PositionClosed(_))
        ));
    }

    #[test]
    fn test_enable_rejects_bad_distance() {
        let mut pos = long_position(dec!(100));
        assert!(matches!(
            enable(&mut pos, dec!(0), dec!(100)),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_enable_seeds_from_better_of_entry_and_price() {
        let mut pos = long_position(dec!(100));
        enable(&mut pos, dec!(10), dec!(120)).unwrap();
        assert_eq!(pos.highest_price, Some(dec!(120)));
        assert_eq!(pos.trailing_stop_price, Some(dec!(108)));

        let mut pos = short_position(dec!(100));
        enable(&mut pos, dec!(10), dec!(80)).unwrap();
        assert_eq!(pos.lowest_price, Some(dec!(80)));
        assert_eq!(pos.trailing_stop_price, Some(dec!(88)));
    }

    #[test]
    fn test_disable_retains_watermark() {
        let mut pos = long_position(dec!(100));
        enable(&mut pos, dec!(5), dec!(100)).unwrap();
        step(&mut pos, dec!(130), Utc::now());

        disable(&mut pos).unwrap();
        assert!(!pos.trailing_stop_enabled);
        assert_eq!(pos.trailing_stop_price, None);
        assert_eq!(pos.trailing_stop_distance, None);
        assert_eq!(pos.highest_price, Some(dec!(130)));

        // Re-enable at a stale, lower price: the old extremum wins, so the
        // stop cannot come back looser than the prior high implies
        enable(&mut pos, dec!(5), dec!(110)).unwrap();
        assert_eq!(pos.highest_price, Some(dec!(130)));
        assert_eq!(pos.trailing_stop_price, Some(dec!(123.5)));
    }
}
