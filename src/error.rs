//! Error taxonomy for the engine.
//!
//! Two blast radii: `Configuration` aborts the whole tick and propagates to
//! the scheduler; everything else is confined to the single campaign or
//! position that raised it and ends up as an ERROR entry in the tick report.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A collaborator is missing or unusable; no item can be evaluated.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Candle or price fetch failed for one symbol.
    #[error("market data unavailable for {symbol}: {reason}")]
    MarketDataUnavailable { symbol: String, reason: String },

    /// The exchange refused an order.
    #[error("exchange rejected order ({code}): {message}")]
    ExchangeRejected { code: i64, message: String },

    /// Quote balance too low for the next ladder order.
    #[error("insufficient {asset} balance: need {required}, have {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    /// Too few candles to compute the indicator.
    #[error("insufficient data: {period}-period EMA needs at least {period} prices, got {available}")]
    InsufficientData { period: usize, available: usize },

    /// Enable/disable invoked on a position that is already closed.
    #[error("position {0} is closed")]
    PositionClosed(i64),

    /// An operation argument failed validation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Optimistic version check failed; another writer got there first.
    #[error("stale {entity} record {id}: version {version} was superseded")]
    StaleRecord {
        entity: &'static str,
        id: i64,
        version: i64,
    },

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl EngineError {
    /// Whether this error must abort the whole tick rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}
