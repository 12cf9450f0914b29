//! Exchange collaborators: market data and order execution.
//!
//! The engine consumes both as traits so ticks run unchanged against the
//! REST client, the paper gateway, or test doubles.

mod paper;
mod rest;
mod types;

pub use paper::PaperGateway;
pub use rest::RestMarketData;
pub use types::{Candle, OrderAmount, OrderFill, OrderRequest};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::EngineError;

/// Read-only market data feed.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles for `symbol`, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> Result<Vec<Candle>, EngineError>;

    /// Last traded price for `symbol`.
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, EngineError>;
}

/// Order execution and balance queries.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Free balance of `asset`, in asset units.
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, EngineError>;

    /// Execute a market order; replays of a known `client_order_id` must
    /// return the original fill.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderFill, EngineError>;
}
