//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables shared by the DCA and trailing-stop passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Candle interval fed to the trend filter, in minutes
    pub candle_interval_minutes: u32,

    /// How many candles to request per evaluation
    pub candle_limit: u32,

    /// EMA period of the trend gate
    pub ema_period: usize,

    /// Quote asset that pays for ladder orders
    pub quote_asset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candle_interval_minutes: 30, // 30m candles
            candle_limit: 200,           // ~4 days of context
            ema_period: 89,              // slow trend line
            quote_asset: "USDT".to_string(),
        }
    }
}
