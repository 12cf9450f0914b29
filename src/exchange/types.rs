//! Exchange-facing data types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::TradeSide;

/// One OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

/// What an order spends: quote currency for buys sized in money, base
/// quantity for flattening a known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAmount {
    Quote(Decimal),
    Base(Decimal),
}

/// Market order request.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub amount: OrderAmount,
    /// Deterministic idempotency key; resubmitting the same id must replay
    /// the original fill instead of filling twice.
    pub client_order_id: String,
}

/// Confirmed fill returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    pub order_id: String,
    pub client_order_id: String,
    pub quantity: Decimal,
    pub fill_price: Decimal,
}
