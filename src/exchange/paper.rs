//! Simulated order gateway: fills at the live price, tracks balances.
//!
//! Close enough to a real exchange for end-to-end runs without moving
//! money: per-asset balances, rejection codes, and replay of known client
//! order ids so a retried submit never fills twice.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::TradeSide;

use super::types::{OrderAmount, OrderFill, OrderRequest};
use super::{MarketData, OrderGateway};

/// Paper-trading gateway over a live price feed.
pub struct PaperGateway<M> {
    market: M,
    quote_asset: String,
    balances: RwLock<HashMap<String, Decimal>>,
    fills: RwLock<HashMap<String, OrderFill>>,
}

impl<M: MarketData> PaperGateway<M> {
    pub fn new(market: M, quote_asset: impl Into<String>, starting_balance: Decimal) -> Self {
        let quote_asset = quote_asset.into();
        let mut balances = HashMap::new();
        balances.insert(quote_asset.clone(), starting_balance);

        Self {
            market,
            quote_asset,
            balances: RwLock::new(balances),
            fills: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<M: MarketData> OrderGateway for PaperGateway<M> {
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, EngineError> {
        Ok(self
            .balances
            .read()
            .await
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderFill, EngineError> {
        // Replays of a known client order id return the original fill and
        // move no additional balance.
        if let Some(fill) = self.fills.read().await.get(&request.client_order_id) {
            info!(
                client_order_id = %request.client_order_id,
                "replaying known order id"
            );
            return Ok(fill.clone());
        }

        let price = self.market.get_current_price(&request.symbol).await?;
        if price <= Decimal::ZERO {
            return Err(EngineError::ExchangeRejected {
                code: -1,
                message: format!("no tradable price for {}", request.symbol),
            });
        }

        let (quantity, cost) = match request.amount {
            OrderAmount::Quote(amount) => ((amount / price).round_dp(8), amount),
            OrderAmount::Base(quantity) => (quantity, quantity * price),
        };
        if quantity <= Decimal::ZERO {
            return Err(EngineError::ExchangeRejected {
                code: -1013,
                message: "order quantity below minimum".to_string(),
            });
        }

        let mut balances = self.balances.write().await;
        match request.side {
            TradeSide::Buy => {
                let available = balances
                    .entry(self.quote_asset.clone())
                    .or_insert(Decimal::ZERO);
                if *available < cost {
                    return Err(EngineError::ExchangeRejected {
                        code: -2010,
                        message: "insufficient balance for requested action".to_string(),
                    });
                }
                *available -= cost;
            }
            TradeSide::Sell => {
                *balances
                    .entry(self.quote_asset.clone())
                    .or_insert(Decimal::ZERO) += cost;
            }
        }
        drop(balances);

        let fill = OrderFill {
            order_id: Uuid::new_v4().to_string(),
            client_order_id: request.client_order_id.clone(),
            quantity,
            fill_price: price,
        };
        self.fills
            .write()
            .await
            .insert(request.client_order_id.clone(), fill.clone());

        info!(
            symbol = %request.symbol,
            side = ?request.side,
            quantity = %quantity,
            price = %price,
            "paper fill"
        );
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Candle;
    use rust_decimal_macros::dec;

    struct FixedPrice(Decimal);

    #[async_trait]
    impl MarketData for FixedPrice {
        async fn get_candles(
            &self,
            _symbol: &str,
            _interval_minutes: u32,
            _limit: u32,
        ) -> Result<Vec<Candle>, EngineError> {
            Ok(vec![])
        }

        async fn get_current_price(&self, _symbol: &str) -> Result<Decimal, EngineError> {
            Ok(self.0)
        }
    }

    fn buy_request(id: &str, amount: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Buy,
            amount: OrderAmount::Quote(amount),
            client_order_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_buy_debits_quote_balance() {
        let gateway = PaperGateway::new(FixedPrice(dec!(50000)), "USDT", dec!(1000));

        let fill = gateway.submit_order(&buy_request("a", dec!(100))).await.unwrap();
        assert_eq!(fill.quantity, dec!(0.002));
        assert_eq!(fill.fill_price, dec!(50000));
        assert_eq!(
            gateway.get_available_balance("USDT").await.unwrap(),
            dec!(900)
        );
    }

    #[tokio::test]
    async fn test_rejects_when_balance_short() {
        let gateway = PaperGateway::new(FixedPrice(dec!(50000)), "USDT", dec!(50));

        let err = gateway
            .submit_order(&buy_request("a", dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ExchangeRejected { code: -2010, .. }
        ));
        assert_eq!(
            gateway.get_available_balance("USDT").await.unwrap(),
            dec!(50)
        );
    }

    #[tokio::test]
    async fn test_replay_moves_no_extra_balance() {
        let gateway = PaperGateway::new(FixedPrice(dec!(50000)), "USDT", dec!(1000));

        let first = gateway.submit_order(&buy_request("dca-1-0", dec!(100))).await.unwrap();
        let replay = gateway.submit_order(&buy_request("dca-1-0", dec!(100))).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(
            gateway.get_available_balance("USDT").await.unwrap(),
            dec!(900)
        );
    }
}
