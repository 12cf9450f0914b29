//! Indicator math over candle closes.

use rust_decimal::Decimal;

use crate::error::EngineError;

/// Exponential moving average over `prices`.
///
/// Output is aligned with the input: the first `period - 1` slots are `None`,
/// slot `period - 1` is seeded with the arithmetic mean of the first `period`
/// prices, and every later slot applies the smoothing step
/// `ema[i] = (price[i] - ema[i-1]) * k + ema[i-1]` with `k = 2 / (period + 1)`.
///
/// Pure: identical input always yields identical output.
pub fn ema(prices: &[Decimal], period: usize) -> Result<Vec<Option<Decimal>>, EngineError> {
    if period == 0 {
        return Err(EngineError::InvalidParameter(
            "EMA period must be positive".to_string(),
        ));
    }
    if prices.len() < period {
        return Err(EngineError::InsufficientData {
            period,
            available: prices.len(),
        });
    }

    let mut out = vec![None; prices.len()];

    let seed = prices[..period].iter().copied().sum::<Decimal>() / Decimal::from(period as u64);
    out[period - 1] = Some(seed);

    let k = Decimal::from(2u32) / Decimal::from(period as u64 + 1);
    let mut prev = seed;
    for i in period..prices.len() {
        let next = (prices[i] - prev) * k + prev;
        out[i] = Some(next);
        prev = next;
    }

    Ok(out)
}

/// Most recent EMA value for a series.
pub fn ema_latest(prices: &[Decimal], period: usize) -> Result<Decimal, EngineError> {
    let series = ema(prices, period)?;
    series
        .last()
        .copied()
        .flatten()
        .ok_or(EngineError::InsufficientData {
            period,
            available: prices.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_close(actual: Decimal, expected: Decimal) {
        let diff = (actual - expected).abs();
        assert!(
            diff < dec!(0.000000000000000000001),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_seed_is_mean_of_first_period() {
        // 1..=90 with period 89: mean of 1..=89 is exactly 45
        let prices: Vec<Decimal> = (1..=90).map(Decimal::from).collect();
        let series = ema(&prices, 89).unwrap();

        assert_eq!(series[87], None);
        assert_eq!(series[88], Some(dec!(45)));

        // ema[89] = (90 - 45) * (2/90) + 45 = 46
        assert_close(series[89].unwrap(), dec!(46));
    }

    #[test]
    fn test_warmup_slots_undefined() {
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let series = ema(&prices, 5).unwrap();

        assert!(series[..4].iter().all(Option::is_none));
        assert!(series[4..].iter().all(Option::is_some));
        assert_eq!(series.len(), prices.len());
    }

    #[test]
    fn test_insufficient_data() {
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let err = ema(&prices, 11).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData {
                period: 11,
                available: 10
            }
        ));
    }

    #[test]
    fn test_deterministic() {
        let prices: Vec<Decimal> = (1..=120).map(Decimal::from).collect();
        assert_eq!(ema(&prices, 89).unwrap(), ema(&prices, 89).unwrap());
    }

    #[test]
    fn test_constant_series_stays_flat() {
        let prices = vec![dec!(250); 100];
        let latest = ema_latest(&prices, 89).unwrap();
        assert_eq!(latest, dec!(250));
    }
}
