//! Append-only trade log entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// One fill or closing event. Written once, never mutated or deleted; this
/// is the audit trail for both the ladder and the trailing stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Store identifier
    pub id: i64,

    /// Traded instrument
    pub symbol: String,

    /// Fill direction
    pub side: TradeSide,

    /// Fill price
    pub price: Decimal,

    /// Base-asset quantity
    pub quantity: Decimal,

    /// Quote value of the fill
    pub total_amount: Decimal,

    /// Why the trade happened, e.g. "DCA auto order #3"
    pub reason: String,

    /// When the fill or close was recorded
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        symbol: String,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
        reason: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            symbol,
            side,
            price,
            quantity,
            total_amount: price * quantity,
            reason,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_amount() {
        let record = TradeRecord::new(
            "BTCUSDT".to_string(),
            TradeSide::Buy,
            dec!(50000),
            dec!(0.002),
            "DCA auto order #1".to_string(),
            Utc::now(),
        );
        assert_eq!(record.total_amount, dec!(100));
    }
}
