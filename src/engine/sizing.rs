//! Ladder order sizing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Multiplier applied to each successive ladder order.
pub const ORDER_SCALE: Decimal = dec!(1.5);

/// Quote amount for ladder order `order_index` (zero-based):
/// `base_amount * 1.5^order_index`.
///
/// The geometric growth buys more as price sits further below trend; the
/// caller has already gated on trend position, so price is not an input.
/// Repeated multiplication keeps the result exact in `Decimal`.
pub fn order_amount(base_amount: Decimal, order_index: u32) -> Decimal {
    let mut amount = base_amount;
    for _ in 0..order_index {
        amount *= ORDER_SCALE;
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_order_is_base() {
        assert_eq!(order_amount(dec!(100), 0), dec!(100));
    }

    #[test]
    fn test_geometric_ratio() {
        let base = dec!(80);
        for i in 0..8 {
            let ratio = order_amount(base, i + 1) / order_amount(base, i);
            assert_eq!(ratio, dec!(1.5));
        }
    }

    #[test]
    fn test_monotonically_increasing() {
        let base = dec!(25);
        let mut prev = Decimal::ZERO;
        for i in 0..10 {
            let amount = order_amount(base, i);
            assert!(amount > prev);
            prev = amount;
        }
    }

    #[test]
    fn test_known_values() {
        assert_eq!(order_amount(dec!(100), 1), dec!(150));
        assert_eq!(order_amount(dec!(100), 2), dec!(225));
        assert_eq!(order_amount(dec!(100), 3), dec!(337.5));
    }
}
