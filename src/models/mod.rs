//! Data models for campaigns, positions, and the trade log.

mod campaign;
mod position;
mod trade;

pub use campaign::Campaign;
pub use position::{Position, PositionStatus, PositionType};
pub use trade::{TradeRecord, TradeSide};
