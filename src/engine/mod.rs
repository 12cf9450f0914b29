//! Decision engines: DCA ladder evaluation and trailing-stop transitions.

pub mod trailing;

mod config;
mod dca;
mod sizing;

pub use config::EngineConfig;
pub use dca::{evaluate_campaign, DcaOutcome};
pub use sizing::{order_amount, ORDER_SCALE};
pub use trailing::StopEvent;
