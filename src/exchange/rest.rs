//! Public REST market data client (Binance-style spot endpoints).
//!
//! Only unauthenticated read endpoints are used, so no request signing is
//! involved; transient failures are retried with exponential backoff before
//! they surface as `MarketDataUnavailable`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EngineError;

use super::types::Candle;
use super::MarketData;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BUDGET: Duration = Duration::from_secs(20);

/// Market data over public spot REST endpoints.
#[derive(Clone)]
pub struct RestMarketData {
    client: Client,
    base_url: String,
}

impl RestMarketData {
    /// Create a client against `EXCHANGE_API_URL`, falling back to the
    /// default base URL.
    pub fn new() -> Result<Self, EngineError> {
        let base_url =
            std::env::var("EXCHANGE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Exchange interval label for a candle width in minutes.
    fn interval_label(minutes: u32) -> Result<&'static str, EngineError> {
        let label = match minutes {
            1 => "1m",
            3 => "3m",
            5 => "5m",
            15 => "15m",
            30 => "30m",
            60 => "1h",
            120 => "2h",
            240 => "4h",
            1440 => "1d",
            other => {
                return Err(EngineError::InvalidParameter(format!(
                    "unsupported candle interval: {other} minutes"
                )))
            }
        };
        Ok(label)
    }

    /// GET `url` and parse the body as JSON, retrying transient failures.
    async fn get_json(&self, url: &str, symbol: &str) -> Result<Value, EngineError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(RETRY_BUDGET),
            ..Default::default()
        };

        backoff::future::retry(policy, || async {
            debug!(url = %url, "fetching market data");

            let response = self.client.get(url).send().await.map_err(|e| {
                warn!(url = %url, error = %e, "market data request failed, retrying");
                backoff::Error::transient(unavailable(symbol, e.to_string()))
            })?;

            let status = response.status();
            if status.is_server_error() {
                warn!(url = %url, status = %status, "market data server error, retrying");
                return Err(backoff::Error::transient(unavailable(
                    symbol,
                    format!("server error {status}"),
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(unavailable(
                    symbol,
                    format!("{status}: {body}"),
                )));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(unavailable(symbol, e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl MarketData for RestMarketData {
    async fn get_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> Result<Vec<Candle>, EngineError> {
        let interval = Self::interval_label(interval_minutes)?;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.min(1000)
        );

        let body = self.get_json(&url, symbol).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| unavailable(symbol, "kline payload is not an array".to_string()))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_kline(row, symbol)?);
        }
        Ok(candles)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, EngineError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let body = self.get_json(&url, symbol).await?;

        let raw = body
            .get("price")
            .and_then(Value::as_str)
            .ok_or_else(|| unavailable(symbol, "ticker payload missing price".to_string()))?;
        parse_decimal(raw, symbol)
    }
}

fn unavailable(symbol: &str, reason: String) -> EngineError {
    EngineError::MarketDataUnavailable {
        symbol: symbol.to_string(),
        reason,
    }
}

/// One kline row is an array:
/// `[open_time, open, high, low, close, volume, close_time, ...]`
/// with prices and volume as strings.
fn parse_kline(row: &Value, symbol: &str) -> Result<Candle, EngineError> {
    let fields = row
        .as_array()
        .ok_or_else(|| unavailable(symbol, "kline row is not an array".to_string()))?;

    let field = |index: usize| -> Result<Decimal, EngineError> {
        let raw = fields
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| unavailable(symbol, format!("kline field {index} missing")))?;
        parse_decimal(raw, symbol)
    };

    let close_millis = fields
        .get(6)
        .and_then(Value::as_i64)
        .ok_or_else(|| unavailable(symbol, "kline close time missing".to_string()))?;
    let close_time = Utc
        .timestamp_millis_opt(close_millis)
        .single()
        .ok_or_else(|| unavailable(symbol, format!("bad kline close time {close_millis}")))?;

    Ok(Candle {
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
        close_time,
    })
}

fn parse_decimal(raw: &str, symbol: &str) -> Result<Decimal, EngineError> {
    Decimal::from_str(raw).map_err(|e| unavailable(symbol, format!("bad decimal '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = json!([
            1700000000000i64,
            "42000.10",
            "42100.00",
            "41900.50",
            "42050.25",
            "12.345",
            1700001799999i64
        ]);

        let candle = parse_kline(&row, "BTCUSDT").unwrap();
        assert_eq!(candle.open, dec!(42000.10));
        assert_eq!(candle.close, dec!(42050.25));
        assert_eq!(candle.volume, dec!(12.345));
        assert_eq!(candle.close_time.timestamp_millis(), 1700001799999);
    }

    #[test]
    fn test_parse_kline_rejects_garbage() {
        let row = json!(["not", "a", "kline"]);
        assert!(matches!(
            parse_kline(&row, "BTCUSDT"),
            Err(EngineError::MarketDataUnavailable { .. })
        ));
    }

    #[test]
    fn test_interval_labels() {
        assert_eq!(RestMarketData::interval_label(30).unwrap(), "30m");
        assert_eq!(RestMarketData::interval_label(1440).unwrap(), "1d");
        assert!(RestMarketData::interval_label(7).is_err());
    }
}
