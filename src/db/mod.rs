//! Persistence for campaigns, positions, and the trade log.
//!
//! The engine talks to the abstract `Store` trait; `SqliteStore` is the
//! concrete relational implementation. Monetary columns are TEXT and round
//! trip through `Decimal` so repeated ticks accumulate no float drift, and
//! every save is a compare-and-swap on the record's version column.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::EngineError;
use crate::models::{Campaign, Position, PositionStatus, PositionType, TradeRecord, TradeSide};

/// Campaign/Position store consumed by the batch evaluator.
#[async_trait]
pub trait Store: Send + Sync {
    /// All campaigns with the active flag set.
    async fn load_active_campaigns(&self) -> Result<Vec<Campaign>, EngineError>;

    /// All ACTIVE positions with the trailing stop armed.
    async fn load_protected_positions(&self) -> Result<Vec<Position>, EngineError>;

    async fn get_position(&self, id: i64) -> Result<Position, EngineError>;

    /// Version-guarded full-record save; bumps `campaign.version` on
    /// success, fails with `StaleRecord` if another writer won.
    async fn save_campaign(&self, campaign: &mut Campaign) -> Result<(), EngineError>;

    /// Version-guarded full-record save, as for campaigns.
    async fn save_position(&self, position: &mut Position) -> Result<(), EngineError>;

    /// Append to the immutable trade log.
    async fn append_trade_record(&self, record: &TradeRecord) -> Result<(), EngineError>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    symbol: String,
    base_amount: String,
    max_orders: i64,
    current_order: i64,
    total_invested: String,
    is_active: bool,
    last_check: Option<String>,
    version: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PositionRow {
    id: i64,
    symbol: String,
    position_type: String,
    entry_price: String,
    quantity: String,
    status: String,
    exit_price: Option<String>,
    exit_date: Option<String>,
    pnl: Option<String>,
    pnl_percentage: Option<String>,
    trailing_stop_enabled: bool,
    trailing_stop_distance: Option<String>,
    trailing_stop_price: Option<String>,
    highest_price: Option<String>,
    lowest_price: Option<String>,
    opened_at: String,
    version: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TradeRow {
    id: i64,
    symbol: String,
    side: String,
    price: String,
    quantity: String,
    total_amount: String,
    reason: String,
    timestamp: String,
}

impl SqliteStore {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self, EngineError> {
        // A pooled in-memory database would hand each connection its own
        // empty schema, so keep memory databases on a single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                base_amount TEXT NOT NULL,
                max_orders INTEGER NOT NULL,
                current_order INTEGER NOT NULL DEFAULT 0,
                total_invested TEXT NOT NULL DEFAULT '0',
                is_active INTEGER NOT NULL DEFAULT 1,
                last_check TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                position_type TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                exit_price TEXT,
                exit_date TEXT,
                pnl TEXT,
                pnl_percentage TEXT,
                trailing_stop_enabled INTEGER NOT NULL DEFAULT 0,
                trailing_stop_distance TEXT,
                trailing_stop_price TEXT,
                highest_price TEXT,
                lowest_price TEXT,
                opened_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                reason TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_active ON campaigns(is_active)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_positions_protected ON positions(status, trailing_stop_enabled)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trade_records(symbol)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Campaigns ====================

    /// Register a new campaign.
    pub async fn create_campaign(
        &self,
        symbol: &str,
        base_amount: Decimal,
        max_orders: u32,
    ) -> Result<Campaign, EngineError> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            INSERT INTO campaigns (symbol, base_amount, max_orders)
            VALUES (?, ?, ?)
            RETURNING id, symbol, base_amount, max_orders, current_order,
                      total_invested, is_active, last_check, version
            "#,
        )
        .bind(symbol)
        .bind(base_amount.to_string())
        .bind(max_orders as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(Campaign::try_from(row)?)
    }

    /// All campaigns, active or not, for operator listings.
    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, EngineError> {
        let rows = sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Campaign::try_from(row).map_err(EngineError::from))
            .collect()
    }

    /// Flip the active flag. Campaigns are never deleted.
    pub async fn set_campaign_active(&self, id: i64, active: bool) -> Result<(), EngineError> {
        let result =
            sqlx::query("UPDATE campaigns SET is_active = ?, version = version + 1 WHERE id = ?")
                .bind(active)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Store(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    // ==================== Positions ====================

    /// Record a manually entered position.
    pub async fn create_position(&self, position: &Position) -> Result<Position, EngineError> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            INSERT INTO positions (symbol, position_type, entry_price, quantity, status, opened_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, symbol, position_type, entry_price, quantity, status,
                      exit_price, exit_date, pnl, pnl_percentage,
                      trailing_stop_enabled, trailing_stop_distance, trailing_stop_price,
                      highest_price, lowest_price, opened_at, version
            "#,
        )
        .bind(&position.symbol)
        .bind(position.position_type.as_str())
        .bind(position.entry_price.to_string())
        .bind(position.quantity.to_string())
        .bind(position.status.as_str())
        .bind(position.opened_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(Position::try_from(row)?)
    }

    /// All positions, open or closed, for operator listings.
    pub async fn list_positions(&self) -> Result<Vec<Position>, EngineError> {
        let rows = sqlx::query_as::<_, PositionRow>("SELECT * FROM positions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Position::try_from(row).map_err(EngineError::from))
            .collect()
    }

    // ==================== Trade log ====================

    /// Most recent trade log entries, newest first.
    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>, EngineError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT * FROM trade_records ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| TradeRecord::try_from(row).map_err(EngineError::from))
            .collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_active_campaigns(&self) -> Result<Vec<Campaign>, EngineError> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Campaign::try_from(row).map_err(EngineError::from))
            .collect()
    }

    async fn load_protected_positions(&self) -> Result<Vec<Position>, EngineError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM positions WHERE status = 'ACTIVE' AND trailing_stop_enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Position::try_from(row).map_err(EngineError::from))
            .collect()
    }

    async fn get_position(&self, id: i64) -> Result<Position, EngineError> {
        let row = sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Position::try_from(row)?)
    }

    async fn save_campaign(&self, campaign: &mut Campaign) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                current_order = ?,
                total_invested = ?,
                is_active = ?,
                last_check = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(campaign.current_order as i64)
        .bind(campaign.total_invested.to_string())
        .bind(campaign.is_active)
        .bind(campaign.last_check.map(|t| t.to_rfc3339()))
        .bind(campaign.id)
        .bind(campaign.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::StaleRecord {
                entity: "campaign",
                id: campaign.id,
                version: campaign.version,
            });
        }
        campaign.version += 1;
        Ok(())
    }

    async fn save_position(&self, position: &mut Position) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE positions SET
                status = ?,
                exit_price = ?,
                exit_date = ?,
                pnl = ?,
                pnl_percentage = ?,
                trailing_stop_enabled = ?,
                trailing_stop_distance = ?,
                trailing_stop_price = ?,
                highest_price = ?,
                lowest_price = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(position.status.as_str())
        .bind(position.exit_price.map(|v| v.to_string()))
        .bind(position.exit_date.map(|t| t.to_rfc3339()))
        .bind(position.pnl.map(|v| v.to_string()))
        .bind(position.pnl_percentage.map(|v| v.to_string()))
        .bind(position.trailing_stop_enabled)
        .bind(position.trailing_stop_distance.map(|v| v.to_string()))
        .bind(position.trailing_stop_price.map(|v| v.to_string()))
        .bind(position.highest_price.map(|v| v.to_string()))
        .bind(position.lowest_price.map(|v| v.to_string()))
        .bind(position.id)
        .bind(position.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::StaleRecord {
                entity: "position",
                id: position.id,
                version: position.version,
            });
        }
        position.version += 1;
        Ok(())
    }

    async fn append_trade_record(&self, record: &TradeRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO trade_records (symbol, side, price, quantity, total_amount, reason, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.side.as_str())
        .bind(record.price.to_string())
        .bind(record.quantity.to_string())
        .bind(record.total_amount.to_string())
        .bind(&record.reason)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ==================== Row decoding ====================

fn decode_decimal(column: &str, raw: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn decode_decimal_opt(column: &str, raw: Option<&str>) -> Result<Option<Decimal>, sqlx::Error> {
    raw.map(|raw| decode_decimal(column, raw)).transpose()
}

fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = sqlx::Error;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Campaign {
            id: row.id,
            base_amount: decode_decimal("base_amount", &row.base_amount)?,
            total_invested: decode_decimal("total_invested", &row.total_invested)?,
            max_orders: row.max_orders as u32,
            current_order: row.current_order as u32,
            is_active: row.is_active,
            last_check: row
                .last_check
                .as_deref()
                .map(|raw| decode_time("last_check", raw))
                .transpose()?,
            version: row.version,
            symbol: row.symbol,
        })
    }
}

impl TryFrom<PositionRow> for Position {
    type Error = sqlx::Error;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let position_type = match row.position_type.as_str() {
            "LONG" => PositionType::Long,
            "SHORT" => PositionType::Short,
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "position_type".to_string(),
                    source: format!("unknown position type '{other}'").into(),
                })
            }
        };
        let status = match row.status.as_str() {
            "ACTIVE" => PositionStatus::Active,
            "CLOSED" => PositionStatus::Closed,
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "status".to_string(),
                    source: format!("unknown position status '{other}'").into(),
                })
            }
        };

        Ok(Position {
            id: row.id,
            position_type,
            status,
            entry_price: decode_decimal("entry_price", &row.entry_price)?,
            quantity: decode_decimal("quantity", &row.quantity)?,
            exit_price: decode_decimal_opt("exit_price", row.exit_price.as_deref())?,
            exit_date: row
                .exit_date
                .as_deref()
                .map(|raw| decode_time("exit_date", raw))
                .transpose()?,
            pnl: decode_decimal_opt("pnl", row.pnl.as_deref())?,
            pnl_percentage: decode_decimal_opt("pnl_percentage", row.pnl_percentage.as_deref())?,
            trailing_stop_enabled: row.trailing_stop_enabled,
            trailing_stop_distance: decode_decimal_opt(
                "trailing_stop_distance",
                row.trailing_stop_distance.as_deref(),
            )?,
            trailing_stop_price: decode_decimal_opt(
                "trailing_stop_price",
                row.trailing_stop_price.as_deref(),
            )?,
            highest_price: decode_decimal_opt("highest_price", row.highest_price.as_deref())?,
            lowest_price: decode_decimal_opt("lowest_price", row.lowest_price.as_deref())?,
            opened_at: decode_time("opened_at", &row.opened_at)?,
            version: row.version,
            symbol: row.symbol,
        })
    }
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = sqlx::Error;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side = match row.side.as_str() {
            "BUY" => TradeSide::Buy,
            "SELL" => TradeSide::Sell,
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "side".to_string(),
                    source: format!("unknown trade side '{other}'").into(),
                })
            }
        };

        Ok(TradeRecord {
            id: row.id,
            side,
            price: decode_decimal("price", &row.price)?,
            quantity: decode_decimal("quantity", &row.quantity)?,
            total_amount: decode_decimal("total_amount", &row.total_amount)?,
            timestamp: decode_time("timestamp", &row.timestamp)?,
            symbol: row.symbol,
            reason: row.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionType;
    use rust_decimal_macros::dec;

    async fn memory_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_campaign_round_trip() {
        let store = memory_store().await;

        let mut campaign = store
            .create_campaign("BTCUSDT", dec!(100.5), 6)
            .await
            .unwrap();
        assert!(campaign.id > 0);
        assert_eq!(campaign.base_amount, dec!(100.5));
        assert_eq!(campaign.version, 0);

        campaign.record_fill(dec!(0.002), dec!(50000), Utc::now());
        store.save_campaign(&mut campaign).await.unwrap();
        assert_eq!(campaign.version, 1);

        let loaded = store.load_active_campaigns().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].current_order, 1);
        assert_eq!(loaded[0].total_invested, dec!(100));
        assert!(loaded[0].last_check.is_some());
    }

    #[tokio::test]
    async fn test_stale_campaign_save_is_rejected() {
        let store = memory_store().await;
        store.create_campaign("BTCUSDT", dec!(100), 6).await.unwrap();

        let mut first = store.load_active_campaigns().await.unwrap().remove(0);
        let mut second = first.clone();

        first.record_fill(dec!(0.002), dec!(50000), Utc::now());
        store.save_campaign(&mut first).await.unwrap();

        second.record_fill(dec!(0.002), dec!(50000), Utc::now());
        let err = store.save_campaign(&mut second).await.unwrap_err();
        assert!(matches!(err, EngineError::StaleRecord { entity: "campaign", .. }));
    }

    #[tokio::test]
    async fn test_paused_campaigns_not_loaded() {
        let store = memory_store().await;
        let a = store.create_campaign("BTCUSDT", dec!(100), 6).await.unwrap();
        store.create_campaign("ETHUSDT", dec!(50), 4).await.unwrap();

        store.set_campaign_active(a.id, false).await.unwrap();

        let active = store.load_active_campaigns().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "ETHUSDT");

        // Still present in the full listing
        assert_eq!(store.list_campaigns().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_protected_position_query() {
        let store = memory_store().await;

        let unprotected = Position::new(
            "BTCUSDT".to_string(),
            PositionType::Long,
            dec!(100),
            dec!(1),
        );
        store.create_position(&unprotected).await.unwrap();

        let protected = Position::new(
            "ETHUSDT".to_string(),
            PositionType::Long,
            dec!(2000),
            dec!(1),
        );
        let mut protected = store.create_position(&protected).await.unwrap();
        crate::engine::trailing::enable(&mut protected, dec!(5), dec!(2000)).unwrap();
        store.save_position(&mut protected).await.unwrap();

        let loaded = store.load_protected_positions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "ETHUSDT");
        assert_eq!(loaded[0].trailing_stop_price, Some(dec!(1900)));
        assert_eq!(loaded[0].trailing_stop_distance, Some(dec!(5)));

        // Closing it removes it from the protected set
        let mut position = loaded.into_iter().next().unwrap();
        position.status = PositionStatus::Closed;
        position.exit_price = Some(dec!(1950));
        position.exit_date = Some(Utc::now());
        store.save_position(&mut position).await.unwrap();

        assert!(store.load_protected_positions().await.unwrap().is_empty());
        let reloaded = store.get_position(position.id).await.unwrap();
        assert_eq!(reloaded.status, PositionStatus::Closed);
        assert_eq!(reloaded.exit_price, Some(dec!(1950)));
    }

    #[tokio::test]
    async fn test_trade_log_round_trip() {
        let store = memory_store().await;

        let record = TradeRecord::new(
            "BTCUSDT".to_string(),
            TradeSide::Buy,
            dec!(50000),
            dec!(0.002),
            "DCA auto order #1".to_string(),
            Utc::now(),
        );
        store.append_trade_record(&record).await.unwrap();

        let trades = store.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, TradeSide::Buy);
        assert_eq!(trades[0].total_amount, dec!(100));
        assert_eq!(trades[0].reason, "DCA auto order #1");
    }
}
