//! Open position with optional trailing-stop protection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::TradeSide;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Long => "LONG",
            PositionType::Short => "SHORT",
        }
    }

    /// The order side that would flatten a position of this type.
    pub fn closing_side(&self) -> TradeSide {
        match self {
            PositionType::Long => TradeSide::Sell,
            PositionType::Short => TradeSide::Buy,
        }
    }
}

/// Lifecycle of a position. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

/// One position under management.
///
/// Exit fields are stamped exactly once, when the status flips to CLOSED.
/// Watermarks outlive a disabled trailing stop so re-enabling resumes from
/// the prior extremum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Store identifier
    pub id: i64,

    /// Traded instrument, e.g. "BTCUSDT"
    pub symbol: String,

    /// Direction
    pub position_type: PositionType,

    /// Average entry price
    pub entry_price: Decimal,

    /// Base-asset size
    pub quantity: Decimal,

    /// ACTIVE until closed, then terminal
    pub status: PositionStatus,

    /// Price the position was closed at
    pub exit_price: Option<Decimal>,

    /// When the position was closed
    pub exit_date: Option<DateTime<Utc>>,

    /// Realized profit and loss, in quote
    pub pnl: Option<Decimal>,

    /// Realized return relative to entry, in percent
    pub pnl_percentage: Option<Decimal>,

    /// Whether the trailing stop is armed
    pub trailing_stop_enabled: bool,

    /// Stop distance from the watermark, in percent, while armed
    pub trailing_stop_distance: Option<Decimal>,

    /// Current stop trigger level, while armed
    pub trailing_stop_price: Option<Decimal>,

    /// Best price seen since entry (longs)
    pub highest_price: Option<Decimal>,

    /// Best price seen since entry (shorts)
    pub lowest_price: Option<Decimal>,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,

    /// Optimistic concurrency guard, bumped on every save
    pub version: i64,
}

impl Position {
    /// Open a new unprotected position.
    pub fn new(
        symbol: String,
        position_type: PositionType,
        entry_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: 0,
            symbol,
            position_type,
            entry_price,
            quantity,
            status: PositionStatus::Active,
            exit_price: None,
            exit_date: None,
            pnl: None,
            pnl_percentage: None,
            trailing_stop_enabled: false,
            trailing_stop_distance: None,
            trailing_stop_price: None,
            highest_price: None,
            lowest_price: None,
            opened_at: Utc::now(),
            version: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Profit and loss if the position were closed at `price`:
    /// `(pnl, pnl percentage)`.
    pub fn pnl_at(&self, price: Decimal) -> (Decimal, Decimal) {
        let diff = match self.position_type {
            PositionType::Long => price - self.entry_price,
            PositionType::Short => self.entry_price - price,
        };
        let pnl = diff * self.quantity;
        let pct = if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            diff / self.entry_price * dec!(100)
        };
        (pnl, pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnl_sign_long() {
        let pos = Position::new("BTCUSDT".to_string(), PositionType::Long, dec!(100), dec!(2));

        let (pnl, pct) = pos.pnl_at(dec!(110));
        assert_eq!(pnl, dec!(20));
        assert_eq!(pct, dec!(10));

        let (pnl, _) = pos.pnl_at(dec!(90));
        assert_eq!(pnl, dec!(-20));
    }

    #[test]
    fn test_pnl_sign_short() {
        let pos = Position::new("BTCUSDT".to_string(), PositionType::Short, dec!(100), dec!(2));

        // Short profits when price falls
        let (pnl, pct) = pos.pnl_at(dec!(90));
        assert_eq!(pnl, dec!(20));
        assert_eq!(pct, dec!(10));

        let (pnl, _) = pos.pnl_at(dec!(110));
        assert_eq!(pnl, dec!(-20));
    }

    #[test]
    fn test_closing_side() {
        assert_eq!(PositionType::Long.closing_side(), TradeSide::Sell);
        assert_eq!(PositionType::Short.closing_side(), TradeSide::Buy);
    }
}
