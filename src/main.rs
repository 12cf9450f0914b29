//! EMA-gated DCA ladder bot with trailing-stop position protection.
//!
//! Buys a fixed symbol ladder whenever price sits below its slow trend
//! line, and ratchets protective stops under open positions as price moves
//! in their favor.

mod bot;
mod db;
mod engine;
mod error;
mod exchange;
mod indicators;
mod models;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::{Bot, BotConfig};
use crate::db::SqliteStore;
use crate::engine::EngineConfig;
use crate::exchange::{PaperGateway, RestMarketData};
use crate::models::{Position, PositionType};

/// DCA ladder bot CLI.
#[derive(Parser)]
#[command(name = "ladderbot")]
#[command(about = "EMA-gated DCA ladders with trailing-stop protection", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./ladderbot.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a DCA campaign for a symbol
    Add {
        /// Symbol to ladder into, e.g. BTCUSDT
        symbol: String,

        /// Quote amount of the first order
        #[arg(short, long)]
        base_amount: Decimal,

        /// Maximum number of ladder orders
        #[arg(short, long, default_value = "6")]
        max_orders: u32,
    },

    /// List all campaigns
    Campaigns,

    /// Pause a campaign
    Pause {
        /// Campaign id
        id: i64,
    },

    /// Resume a paused campaign
    Resume {
        /// Campaign id
        id: i64,
    },

    /// Record a manually entered position
    Open {
        /// Symbol, e.g. BTCUSDT
        symbol: String,

        /// long or short
        position_type: String,

        /// Entry price
        #[arg(short, long)]
        entry: Decimal,

        /// Base-asset quantity
        #[arg(short, long)]
        quantity: Decimal,
    },

    /// List all positions
    Positions,

    /// Arm a trailing stop on a position
    SetStop {
        /// Position id
        id: i64,

        /// Stop distance from the watermark, in percent
        #[arg(short = 'D', long)]
        distance: Decimal,

        /// Reference price to seed the watermark (default: live price)
        #[arg(short, long)]
        price: Option<Decimal>,
    },

    /// Disarm a trailing stop (watermarks are kept)
    ClearStop {
        /// Position id
        id: i64,
    },

    /// Show recent trade log entries
    Trades {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Run both evaluation passes once and print the reports
    Tick {
        /// Paper-trading quote balance
        #[arg(short, long, default_value = "10000")]
        balance: Decimal,
    },

    /// Run the scheduler loop until interrupted
    Run {
        /// Seconds between ticks
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Paper-trading quote balance
        #[arg(short, long, default_value = "10000")]
        balance: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize store
    let store = SqliteStore::new(&cli.database).await?;
    let engine_config = EngineConfig::default();

    match cli.command {
        Commands::Add {
            symbol,
            base_amount,
            max_orders,
        } => {
            let symbol = symbol.to_uppercase();
            let campaign = store.create_campaign(&symbol, base_amount, max_orders).await?;

            println!("Created campaign #{} for {}", campaign.id, campaign.symbol);
            println!("  First order:  {} {}", campaign.base_amount, engine_config.quote_asset);
            println!("  Ladder size:  {} orders", campaign.max_orders);

            let total: Decimal = (0..campaign.max_orders)
                .map(|i| engine::order_amount(campaign.base_amount, i))
                .sum();
            println!("  Full ladder:  {} {}", total, engine_config.quote_asset);
        }

        Commands::Campaigns => {
            let campaigns = store.list_campaigns().await?;

            if campaigns.is_empty() {
                println!("No campaigns. Use 'ladderbot add <symbol> -b <amount>' to create one.");
                return Ok(());
            }

            println!(
                "\n{:<4} {:<12} {:>12} {:>9} {:>14} {:<8}",
                "ID", "SYMBOL", "BASE", "ORDERS", "INVESTED", "STATE"
            );
            println!("{}", "-".repeat(64));

            for c in campaigns {
                let state = if c.is_completed() {
                    "done"
                } else if c.is_active {
                    "active"
                } else {
                    "paused"
                };
                println!(
                    "{:<4} {:<12} {:>12} {:>5}/{:<3} {:>14} {:<8}",
                    c.id, c.symbol, c.base_amount, c.current_order, c.max_orders,
                    c.total_invested, state
                );
            }
        }

        Commands::Pause { id } => {
            store.set_campaign_active(id, false).await?;
            println!("Paused campaign #{id}");
        }

        Commands::Resume { id } => {
            store.set_campaign_active(id, true).await?;
            println!("Resumed campaign #{id}");
        }

        Commands::Open {
            symbol,
            position_type,
            entry,
            quantity,
        } => {
            let position_type = match position_type.to_lowercase().as_str() {
                "long" => PositionType::Long,
                "short" => PositionType::Short,
                other => anyhow::bail!("position type must be 'long' or 'short', got '{other}'"),
            };
            if entry <= Decimal::ZERO || quantity <= Decimal::ZERO {
                anyhow::bail!("entry price and quantity must be positive");
            }

            let position = Position::new(symbol.to_uppercase(), position_type, entry, quantity);
            let position = store.create_position(&position).await?;

            println!(
                "Opened position #{}: {} {} {} @ {}",
                position.id,
                position.position_type.as_str(),
                position.quantity,
                position.symbol,
                position.entry_price
            );
        }

        Commands::Positions => {
            let positions = store.list_positions().await?;

            if positions.is_empty() {
                println!("No positions.");
                return Ok(());
            }

            println!(
                "\n{:<4} {:<12} {:<6} {:>12} {:>12} {:<7} {:>12} {:>10}",
                "ID", "SYMBOL", "TYPE", "ENTRY", "QTY", "STATE", "STOP", "PNL"
            );
            println!("{}", "-".repeat(84));

            for p in positions {
                let stop = p
                    .trailing_stop_price
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let pnl = p
                    .pnl
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<4} {:<12} {:<6} {:>12} {:>12} {:<7} {:>12} {:>10}",
                    p.id,
                    p.symbol,
                    p.position_type.as_str(),
                    p.entry_price,
                    p.quantity,
                    p.status.as_str(),
                    stop,
                    pnl
                );
            }
        }

        Commands::SetStop { id, distance, price } => {
            let market = RestMarketData::new()?;
            let gateway = PaperGateway::new(market.clone(), &engine_config.quote_asset, dec!(0));
            let bot = Bot::new(
                BotConfig {
                    engine: engine_config,
                    ..Default::default()
                },
                market,
                gateway,
                store,
            );

            let position = bot.set_trailing_stop(id, true, Some(distance), price).await?;
            println!(
                "Armed trailing stop on #{}: distance {}%, stop at {}",
                position.id,
                distance,
                position
                    .trailing_stop_price
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            );
        }

        Commands::ClearStop { id } => {
            let market = RestMarketData::new()?;
            let gateway = PaperGateway::new(market.clone(), &engine_config.quote_asset, dec!(0));
            let bot = Bot::new(
                BotConfig {
                    engine: engine_config,
                    ..Default::default()
                },
                market,
                gateway,
                store,
            );

            bot.set_trailing_stop(id, false, None, None).await?;
            println!("Disarmed trailing stop on #{id} (watermarks kept)");
        }

        Commands::Trades { limit } => {
            let trades = store.recent_trades(limit).await?;

            if trades.is_empty() {
                println!("No trades recorded yet.");
                return Ok(());
            }

            println!(
                "\n{:<4} {:<12} {:<5} {:>12} {:>12} {:>12} {}",
                "ID", "SYMBOL", "SIDE", "PRICE", "QTY", "TOTAL", "REASON"
            );
            println!("{}", "-".repeat(90));

            for t in trades {
                println!(
                    "{:<4} {:<12} {:<5} {:>12} {:>12} {:>12} {}",
                    t.id,
                    t.symbol,
                    t.side.as_str(),
                    t.price,
                    t.quantity,
                    t.total_amount,
                    t.reason
                );
            }
        }

        Commands::Tick { balance } => {
            let market = RestMarketData::new()?;
            let gateway =
                PaperGateway::new(market.clone(), &engine_config.quote_asset, balance);
            let bot = Bot::new(
                BotConfig {
                    engine: engine_config,
                    ..Default::default()
                },
                market,
                gateway,
                store,
            );

            println!("=== DCA pass ===");
            let report = bot.run_dca_tick().await?;
            print!("{report}");

            println!("\n=== Trailing-stop pass ===");
            let report = bot.run_trailing_tick().await?;
            print!("{report}");
        }

        Commands::Run { interval, balance } => {
            info!(interval = interval, balance = %balance, "starting scheduler loop");

            let market = RestMarketData::new()?;
            let gateway =
                PaperGateway::new(market.clone(), &engine_config.quote_asset, balance);
            let bot = Bot::new(
                BotConfig {
                    poll_interval_secs: interval,
                    engine: engine_config,
                },
                market,
                gateway,
                store,
            );

            println!("\n=== ladderbot ===");
            println!("Tick interval: {interval}s");
            println!("Paper balance: {balance}");
            println!("\nPress Ctrl+C to stop.\n");

            bot.run().await?;
        }
    }

    Ok(())
}
