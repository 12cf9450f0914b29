//! DCA decision engine: one campaign, one tick.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::exchange::{MarketData, OrderAmount, OrderGateway, OrderRequest};
use crate::indicators;
use crate::models::{Campaign, TradeRecord, TradeSide};

use super::config::EngineConfig;
use super::sizing::order_amount;

/// Outcome of evaluating one campaign for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DcaOutcome {
    /// Ladder full or campaign paused; no collaborator was called.
    Completed,
    /// Price at or above trend; no order this tick.
    Skipped {
        current_price: Decimal,
        ema: Decimal,
        distance_pct: Decimal,
    },
    /// The next ladder order was placed and filled.
    Executed {
        order_index: u32,
        spent: Decimal,
        quantity: Decimal,
        fill_price: Decimal,
    },
}

/// Evaluate `campaign` against fresh candles and possibly place the next
/// ladder order.
///
/// On a fill the campaign is mutated in place and the matching trade record
/// is returned; persisting both stays with the caller. On any error the
/// campaign is left untouched and retry is deferred to the next tick.
pub async fn evaluate_campaign<M, G>(
    campaign: &mut Campaign,
    market: &M,
    gateway: &G,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<(DcaOutcome, Option<TradeRecord>), EngineError>
where
    M: MarketData,
    G: OrderGateway,
{
    if !campaign.is_active || campaign.is_completed() {
        return Ok((DcaOutcome::Completed, None));
    }

    let candles = market
        .get_candles(
            &campaign.symbol,
            config.candle_interval_minutes,
            config.candle_limit,
        )
        .await?;
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

    let ema = indicators::ema_latest(&closes, config.ema_period)?;
    let current_price = closes
        .last()
        .copied()
        .ok_or(EngineError::InsufficientData {
            period: config.ema_period,
            available: 0,
        })?;

    if current_price >= ema {
        let distance_pct = if ema.is_zero() {
            Decimal::ZERO
        } else {
            (current_price - ema) / ema * dec!(100)
        };
        debug!(
            symbol = %campaign.symbol,
            price = %current_price,
            ema = %ema,
            distance_pct = %distance_pct,
            "price at or above trend, no order"
        );
        return Ok((
            DcaOutcome::Skipped {
                current_price,
                ema,
                distance_pct,
            },
            None,
        ));
    }

    let amount = order_amount(campaign.base_amount, campaign.current_order);

    let available = gateway.get_available_balance(&config.quote_asset).await?;
    if available < amount {
        return Err(EngineError::InsufficientBalance {
            asset: config.quote_asset.clone(),
            required: amount,
            available,
        });
    }

    // Deterministic per ladder slot: a crash between submit and persist
    // resubmits the same id next tick and the gateway replays the original
    // fill instead of buying twice.
    let client_order_id = format!("dca-{}-{}", campaign.id, campaign.current_order);
    let request = OrderRequest {
        symbol: campaign.symbol.clone(),
        side: TradeSide::Buy,
        amount: OrderAmount::Quote(amount),
        client_order_id,
    };
    let fill = gateway.submit_order(&request).await?;

    campaign.record_fill(fill.quantity, fill.fill_price, now);

    let record = TradeRecord::new(
        campaign.symbol.clone(),
        TradeSide::Buy,
        fill.fill_price,
        fill.quantity,
        format!("DCA auto order #{}", campaign.current_order),
        now,
    );

    info!(
        symbol = %campaign.symbol,
        order = campaign.current_order,
        spent = %amount,
        quantity = %fill.quantity,
        price = %fill.fill_price,
        "ladder order filled"
    );

    Ok((
        DcaOutcome::Executed {
            order_index: campaign.current_order,
            spent: amount,
            quantity: fill.quantity,
            fill_price: fill.fill_price,
        },
        Some(record),
    ))
}
