//! DCA campaign: ladder configuration and progress for one symbol.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persistent ladder state for one traded symbol.
///
/// Created by operator configuration, mutated only by the decision engine
/// after a confirmed fill. Campaigns are never deleted; pausing is a flag
/// flip so the audit trail stays intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Store identifier
    pub id: i64,

    /// Traded instrument, e.g. "BTCUSDT"
    pub symbol: String,

    /// Quote amount of the first ladder order
    pub base_amount: Decimal,

    /// Hard cap on orders ever placed
    pub max_orders: u32,

    /// Orders already placed, in `[0, max_orders]`
    pub current_order: u32,

    /// Sum of quote actually spent across fills
    pub total_invested: Decimal,

    /// Paused campaigns are skipped entirely
    pub is_active: bool,

    /// Most recent evaluation that mutated the campaign
    pub last_check: Option<DateTime<Utc>>,

    /// Optimistic concurrency guard, bumped on every save
    pub version: i64,
}

impl Campaign {
    /// Create a fresh campaign with no orders placed yet.
    pub fn new(symbol: String, base_amount: Decimal, max_orders: u32) -> Self {
        Self {
            id: 0,
            symbol,
            base_amount,
            max_orders,
            current_order: 0,
            total_invested: Decimal::ZERO,
            is_active: true,
            last_check: None,
            version: 0,
        }
    }

    /// A campaign that has placed its full ladder never trades again,
    /// regardless of the active flag.
    pub fn is_completed(&self) -> bool {
        self.current_order >= self.max_orders
    }

    /// Record a confirmed fill: advance the ladder and account the spend.
    pub fn record_fill(&mut self, quantity: Decimal, fill_price: Decimal, now: DateTime<Utc>) {
        self.current_order += 1;
        self.total_invested += quantity * fill_price;
        self.last_check = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_completed_when_ladder_full() {
        let mut campaign = Campaign::new("BTCUSDT".to_string(), dec!(100), 2);
        assert!(!campaign.is_completed());

        campaign.current_order = 2;
        assert!(campaign.is_completed());

        // Still completed even while active
        assert!(campaign.is_active);
    }

    #[test]
    fn test_record_fill_accumulates() {
        let mut campaign = Campaign::new("ETHUSDT".to_string(), dec!(50), 6);
        let now = Utc::now();

        campaign.record_fill(dec!(0.04), dec!(2500), now);
        assert_eq!(campaign.current_order, 1);
        assert_eq!(campaign.total_invested, dec!(100));
        assert_eq!(campaign.last_check, Some(now));

        campaign.record_fill(dec!(0.06), dec!(2500), now);
        assert_eq!(campaign.current_order, 2);
        assert_eq!(campaign.total_invested, dec!(250));
    }
}
