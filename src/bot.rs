//! Bot runner: scheduled evaluation of all campaigns and protected positions.
//!
//! Handles:
//! - The DCA pass: candles -> trend gate -> ladder order -> persist
//! - The trailing-stop pass: price -> transition -> persist
//! - Per-item failure isolation and the tick report
//! - The scheduler loop with graceful shutdown
//!
//! Each tick is one sequential pass. Items are independent; an error in one
//! campaign or position becomes an ERROR entry in the report and never
//! aborts the batch. Only configuration errors abort a tick.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::Store;
use crate::engine::{self, trailing, DcaOutcome, EngineConfig, StopEvent};
use crate::error::EngineError;
use crate::exchange::{MarketData, OrderGateway};
use crate::models::{Campaign, Position, TradeRecord};

/// Outcome tag for one item in a tick report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Executed,
    Updated,
    Closed,
    Skipped,
    Completed,
    Error,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Executed => "EXECUTED",
            TickOutcome::Updated => "UPDATED",
            TickOutcome::Closed => "CLOSED",
            TickOutcome::Skipped => "SKIPPED",
            TickOutcome::Completed => "COMPLETED",
            TickOutcome::Error => "ERROR",
        }
    }
}

/// Per-item entry in a tick report.
#[derive(Debug, Clone)]
pub struct TickEntry {
    pub item_id: i64,
    pub symbol: String,
    pub outcome: TickOutcome,
    pub detail: String,
}

/// Report for one batch pass; the sole user-facing artifact of a tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub entries: Vec<TickEntry>,
}

impl TickReport {
    fn push(
        &mut self,
        item_id: i64,
        symbol: String,
        outcome: TickOutcome,
        detail: impl Into<String>,
    ) {
        self.entries.push(TickEntry {
            item_id,
            symbol,
            outcome,
            detail: detail.into(),
        });
    }

    pub fn count(&self, outcome: TickOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "  #{:<4} {:<12} {:<10} {}",
                entry.item_id,
                entry.symbol,
                entry.outcome.as_str(),
                entry.detail
            )?;
        }
        writeln!(
            f,
            "{} items: {} executed, {} updated, {} closed, {} skipped, {} completed, {} errors",
            self.entries.len(),
            self.count(TickOutcome::Executed),
            self.count(TickOutcome::Updated),
            self.count(TickOutcome::Closed),
            self.count(TickOutcome::Skipped),
            self.count(TickOutcome::Completed),
            self.count(TickOutcome::Error)
        )
    }
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Seconds between scheduled ticks
    pub poll_interval_secs: u64,

    /// Engine tunables
    pub engine: EngineConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            engine: EngineConfig::default(),
        }
    }
}

/// Main bot runner, generic over its collaborators so ticks run unchanged
/// against live clients, the paper gateway, or test doubles.
pub struct Bot<M, G, S> {
    config: BotConfig,
    market: M,
    gateway: G,
    store: S,
    shutdown: Arc<AtomicBool>,
}

impl<M, G, S> Bot<M, G, S>
where
    M: MarketData,
    G: OrderGateway,
    S: Store,
{
    pub fn new(config: BotConfig, market: M, gateway: G, store: S) -> Self {
        Self {
            config,
            market,
            gateway,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run both passes on the configured cadence until shutdown.
    pub async fn run(&self) -> Result<(), EngineError> {
        info!(
            poll_interval = self.config.poll_interval_secs,
            "starting bot run loop"
        );

        let mut poll = interval(Duration::from_secs(self.config.poll_interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll.tick().await;

            match self.run_dca_tick().await {
                Ok(report) => debug!(items = report.entries.len(), "DCA tick done"),
                Err(e) => error!(error = %e, "DCA tick aborted"),
            }
            match self.run_trailing_tick().await {
                Ok(report) => debug!(items = report.entries.len(), "trailing tick done"),
                Err(e) => error!(error = %e, "trailing tick aborted"),
            }
        }

        info!("bot stopped");
        Ok(())
    }

    // ==================== DCA pass ====================

    /// Evaluate every active campaign once.
    pub async fn run_dca_tick(&self) -> Result<TickReport, EngineError> {
        let campaigns = self.store.load_active_campaigns().await?;
        debug!(count = campaigns.len(), "starting DCA pass");

        let mut report = TickReport::default();
        for mut campaign in campaigns {
            let id = campaign.id;
            let symbol = campaign.symbol.clone();

            match self.evaluate_one_campaign(&mut campaign).await {
                Ok(DcaOutcome::Completed) => {
                    report.push(id, symbol, TickOutcome::Completed, "ladder complete")
                }
                Ok(DcaOutcome::Skipped {
                    current_price,
                    ema,
                    distance_pct,
                }) => report.push(
                    id,
                    symbol,
                    TickOutcome::Skipped,
                    format!("price {current_price} vs ema {ema} ({distance_pct:+.2}%)"),
                ),
                Ok(DcaOutcome::Executed {
                    order_index,
                    spent,
                    quantity,
                    fill_price,
                }) => report.push(
                    id,
                    symbol,
                    TickOutcome::Executed,
                    format!("order #{order_index}: {quantity} @ {fill_price} ({spent} spent)"),
                ),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(campaign = id, error = %e, "campaign evaluation failed");
                    report.push(id, symbol, TickOutcome::Error, e.to_string());
                }
            }
        }

        info!(
            total = report.entries.len(),
            executed = report.count(TickOutcome::Executed),
            errors = report.count(TickOutcome::Error),
            "DCA pass complete"
        );
        Ok(report)
    }

    async fn evaluate_one_campaign(
        &self,
        campaign: &mut Campaign,
    ) -> Result<DcaOutcome, EngineError> {
        let (outcome, record) = engine::evaluate_campaign(
            campaign,
            &self.market,
            &self.gateway,
            &self.config.engine,
            Utc::now(),
        )
        .await?;

        if matches!(outcome, DcaOutcome::Executed { .. }) {
            self.store.save_campaign(campaign).await?;
            if let Some(record) = record {
                self.store.append_trade_record(&record).await?;
            }
        }
        Ok(outcome)
    }

    // ==================== Trailing-stop pass ====================

    /// Advance every protected position once.
    pub async fn run_trailing_tick(&self) -> Result<TickReport, EngineError> {
        let positions = self.store.load_protected_positions().await?;
        debug!(count = positions.len(), "starting trailing-stop pass");

        let mut report = TickReport::default();
        for mut position in positions {
            let id = position.id;
            let symbol = position.symbol.clone();

            match self.advance_one_position(&mut position).await {
                Ok(StopEvent::Closed {
                    exit_price, pnl, ..
                }) => report.push(
                    id,
                    symbol,
                    TickOutcome::Closed,
                    format!("stopped out at {exit_price}, pnl {pnl}"),
                ),
                Ok(StopEvent::Ratcheted {
                    watermark,
                    stop_price,
                }) => report.push(
                    id,
                    symbol,
                    TickOutcome::Updated,
                    format!("new watermark {watermark}, stop {stop_price}"),
                ),
                Ok(StopEvent::Unchanged) => {
                    report.push(id, symbol, TickOutcome::Skipped, "inside band")
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(position = id, error = %e, "position evaluation failed");
                    report.push(id, symbol, TickOutcome::Error, e.to_string());
                }
            }
        }

        info!(
            total = report.entries.len(),
            closed = report.count(TickOutcome::Closed),
            errors = report.count(TickOutcome::Error),
            "trailing-stop pass complete"
        );
        Ok(report)
    }

    async fn advance_one_position(
        &self,
        position: &mut Position,
    ) -> Result<StopEvent, EngineError> {
        let price = self.market.get_current_price(&position.symbol).await?;
        let now = Utc::now();

        let event = trailing::step(position, price, now);
        match &event {
            StopEvent::Closed {
                exit_price, pnl, ..
            } => {
                self.store.save_position(position).await?;
                let record = TradeRecord::new(
                    position.symbol.clone(),
                    position.position_type.closing_side(),
                    *exit_price,
                    position.quantity,
                    "trailing stop triggered".to_string(),
                    now,
                );
                self.store.append_trade_record(&record).await?;
                info!(
                    position = position.id,
                    symbol = %position.symbol,
                    exit_price = %exit_price,
                    pnl = %pnl,
                    "trailing stop closed position"
                );
            }
            StopEvent::Ratcheted { stop_price, .. } => {
                self.store.save_position(position).await?;
                debug!(
                    position = position.id,
                    stop = %stop_price,
                    "trailing stop ratcheted"
                );
            }
            StopEvent::Unchanged => {}
        }
        Ok(event)
    }

    // ==================== Trailing-stop control ====================

    /// Enable or disable the trailing stop on one position.
    ///
    /// Enabling without an explicit reference price fetches the live price
    /// to seed the watermark.
    pub async fn set_trailing_stop(
        &self,
        position_id: i64,
        enabled: bool,
        distance: Option<Decimal>,
        reference_price: Option<Decimal>,
    ) -> Result<Position, EngineError> {
        let mut position = self.store.get_position(position_id).await?;

        if enabled {
            let distance = distance.ok_or_else(|| {
                EngineError::InvalidParameter(
                    "trailing distance is required to enable a stop".to_string(),
                )
            })?;
            let reference = match reference_price {
                Some(price) => price,
                None => self.market.get_current_price(&position.symbol).await?,
            };
            trailing::enable(&mut position, distance, reference)?;
            info!(
                position = position_id,
                distance = %distance,
                stop = ?position.trailing_stop_price,
                "trailing stop enabled"
            );
        } else {
            trailing::disable(&mut position)?;
            info!(position = position_id, "trailing stop disabled");
        }

        self.store.save_position(&mut position).await?;
        Ok(position)
    }
}
