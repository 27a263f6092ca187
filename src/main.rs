use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sentinel::api::{BinanceClient, BinanceTrader, TelegramNotifier};
use sentinel::config::BINANCE_STREAM;
use sentinel::execution::{
    ManualTrades, OrderGateway, PriceOracle, QuoteProvider, TradeLifecycle,
};
use sentinel::persistence::{KeyValueStore, MemoryStore, RedisStore, Store};
use sentinel::sniper::{run_stream, CvdSniper};
use sentinel::{Settings, TradeType, TradingMode};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

/// A heartbeat older than this is reported as WARNING
const HEARTBEAT_STALE_SECS: i64 = 90;

#[derive(Parser)]
#[command(name = "sentinel", about = "Spot crypto trading agent (simulated or live)")]
struct Cli {
    /// Use an in-process store instead of Redis; nothing is persisted
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Cycle driver, sniper streams and heartbeat until Ctrl+C (default)
    Run,
    /// Run a single scan cycle and print the report as JSON
    Cycle,
    /// Streaming sniper only
    Sniper,
    /// Heartbeat health, wallet and open trades
    Status,
    /// Inspect or edit the wallet config
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Drop every open sniper trade record
    ClearSniper,
    /// Record or close a regular trade by hand
    Trade {
        #[command(subcommand)]
        action: TradeAction,
    },
    /// Closed-trade history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum TradeAction {
    /// Open a LONG or SHORT sized at the wallet's risk percentage
    Open {
        symbol: String,
        side: TradeType,
        /// Entry price; defaults to the live quote (ask for LONG, bid for SHORT)
        #[arg(long)]
        price: Option<f64>,
    },
    /// Close an open trade by id and record it in the history
    Close {
        id: String,
        /// Exit price; defaults to the live quote (bid for LONG, ask for SHORT)
        exit_price: Option<f64>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    Show,
    Clear,
}

#[derive(Subcommand)]
enum WalletAction {
    Show,
    /// Restart the wallet at BALANCE (initial, current and allocated)
    Reset { balance: f64 },
    /// Merge a partial JSON config, e.g. '{"strategy":"SNIPER","riskPercentage":5}'
    Set { patch: String },
}

/// Everything the subcommands need, built once from settings
struct App {
    settings: Settings,
    store: Store,
    market: BinanceClient,
    gateway: OrderGateway,
    notifier: TelegramNotifier,
}

impl App {
    async fn build(settings: Settings, dry_run: bool) -> anyhow::Result<Self> {
        let backend: Arc<dyn KeyValueStore> = if dry_run {
            tracing::info!("🧪 Dry run: using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            let redis = RedisStore::connect(&settings.redis_url)
                .await
                .with_context(|| format!("connecting to Redis at {}", settings.redis_url))?;
            Arc::new(redis)
        };
        let store = Store::new(backend).with_default_mode(settings.trading_mode);

        let market = BinanceClient::new(
            settings.exchange_bases(),
            settings.http_timeout(),
            settings.rate_limit_per_minute,
        )?;
        let gateway = OrderGateway::new(BinanceTrader::from_settings(&settings)?);
        let notifier = TelegramNotifier::new(
            settings.telegram_token.clone(),
            settings.telegram_chat_id.clone(),
        );

        Ok(Self {
            settings,
            store,
            market,
            gateway,
            notifier,
        })
    }

    fn lifecycle(&self) -> anyhow::Result<TradeLifecycle> {
        let oracle = self.oracle()?;
        Ok(TradeLifecycle::new(
            self.store.clone(),
            Arc::new(self.market.clone()),
            Arc::new(oracle),
            Arc::new(self.gateway.clone()),
            self.notifier.clone(),
        )
        .with_universe(self.settings.universe_size, self.settings.min_quote_volume))
    }

    fn oracle(&self) -> anyhow::Result<PriceOracle> {
        Ok(PriceOracle::from_settings(&self.settings, &self.market)?)
    }

    fn manual(&self) -> ManualTrades {
        ManualTrades::new(self.store.clone(), self.notifier.clone())
    }

    fn sniper(&self) -> Arc<CvdSniper> {
        Arc::new(CvdSniper::new(
            self.store.clone(),
            Arc::new(self.gateway.clone()),
            self.notifier.clone(),
        ))
    }

    fn spawn_streams(&self, sniper: &Arc<CvdSniper>) -> Vec<JoinHandle<()>> {
        self.settings
            .sniper_symbols()
            .into_iter()
            .map(|symbol| {
                let sniper = sniper.clone();
                tokio::spawn(run_stream(sniper, symbol, BINANCE_STREAM.to_string()))
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    let app = App::build(settings, cli.dry_run).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&app).await,
        Command::Cycle => {
            let report = app.lifecycle()?.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Sniper => run_sniper(&app).await,
        Command::Status => status(&app).await,
        Command::Wallet { action } => wallet(&app, action).await,
        Command::ClearSniper => {
            app.store.clear_sniper_trades().await?;
            tracing::info!("🧹 Sniper trades cleared");
            Ok(())
        }
        Command::Trade { action } => trade(&app, action).await,
        Command::History { action } => history(&app, action).await,
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentinel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(app: &App) -> anyhow::Result<()> {
    tracing::info!("🚀 Sentinel starting ({:?} region)", app.settings.region);

    let lifecycle = app.lifecycle()?;
    let cycle_secs = app.settings.cycle_interval_secs.max(1);
    let cycle_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(cycle_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            tracing::info!("💹 [CYCLE] Tick at {}", Utc::now().format("%H:%M:%S"));
            match lifecycle.run_cycle().await {
                Ok(report) => tracing::info!(
                    "✅ Cycle done: {} active, {} alerts",
                    report.active_count,
                    report.new_alerts.len()
                ),
                Err(e) => tracing::error!("❌ Cycle aborted: {}", e),
            }
        }
    });

    let sniper = app.sniper();
    let streams = app.spawn_streams(&sniper);

    tracing::info!(
        "✅ Cycle every {}s, sniper on {:?}",
        cycle_secs,
        app.settings.sniper_symbols()
    );
    tracing::info!("Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = cycle_task => {
            tracing::error!("Cycle loop exited: {:?}", result);
        }
    }

    for stream in streams {
        stream.abort();
    }
    tracing::info!("👋 Sentinel stopped");
    Ok(())
}

async fn run_sniper(app: &App) -> anyhow::Result<()> {
    let sniper = app.sniper();
    let streams = app.spawn_streams(&sniper);

    tokio::signal::ctrl_c().await?;
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");
    for stream in streams {
        stream.abort();
    }
    Ok(())
}

async fn status(app: &App) -> anyhow::Result<()> {
    let now = Utc::now();
    let health = match app.store.heartbeat().await? {
        Some(beat) if (now - beat).num_seconds() < HEARTBEAT_STALE_SECS => {
            format!("HEALTHY (last cycle {}s ago)", (now - beat).num_seconds())
        }
        Some(beat) => format!("WARNING (last cycle {}s ago)", (now - beat).num_seconds()),
        None => "WARNING (no heartbeat yet)".to_string(),
    };

    let wallet = app.store.load_wallet().await?;
    let active = app.store.active_trades().await?;
    let sniper = app.store.sniper_trades().await?;
    let history = app.store.win_history().await?;

    println!("Status:      {}", health);
    println!("Mode:        {:?} / {}", wallet.trading_mode, wallet.strategy);
    println!("Bot active:  {}", wallet.is_bot_active);
    println!(
        "Balance:     ${:.2} (initial ${:.2})",
        wallet.current_balance, wallet.initial_balance
    );

    if wallet.trading_mode == TradingMode::Live {
        let trader = BinanceTrader::from_settings(&app.settings)?
            .ok_or(sentinel::BotError::MissingCredentials)?;
        let usdt = trader.account_balance("USDT").await?;
        println!(
            "Exchange:    ${:.2} USDT ({:.2} free, {:.2} locked)",
            usdt.total(),
            usdt.free,
            usdt.locked
        );
    }

    println!("Open trades: {} regular, {} sniper", active.len(), sniper.len());
    for trade in active.iter().chain(sniper.iter()) {
        println!(
            "  {} {:?} @ {} (${:.2})",
            trade.symbol, trade.trade_type, trade.entry_price, trade.invested_amount
        );
    }
    println!(
        "Closed:      {} (net ${:.2})",
        history.len(),
        history.iter().map(|h| h.profit_usd).sum::<f64>()
    );
    Ok(())
}

async fn wallet(app: &App, action: WalletAction) -> anyhow::Result<()> {
    let wallet = match action {
        WalletAction::Show => app.store.load_wallet().await?,
        WalletAction::Reset { balance } => {
            anyhow::ensure!(balance >= 0.0, "balance must not be negative");
            app.store.reset_wallet(balance).await?
        }
        WalletAction::Set { patch } => {
            let patch: serde_json::Value =
                serde_json::from_str(&patch).context("wallet patch must be JSON")?;
            app.store.merge_wallet(patch).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&wallet)?);
    Ok(())
}

async fn trade(app: &App, action: TradeAction) -> anyhow::Result<()> {
    match action {
        TradeAction::Open {
            symbol,
            side,
            price,
        } => {
            let symbol = symbol.to_uppercase();
            let price = match price {
                Some(price) => price,
                None => side.entry_price(&app.oracle()?.resolve_quote(&symbol).await?),
            };
            let trade = app.manual().open(&symbol, side, price).await?;
            println!("{}", serde_json::to_string_pretty(&trade)?);
        }
        TradeAction::Close { id, exit_price } => {
            let exit_price = match exit_price {
                Some(price) => price,
                None => {
                    let open = app
                        .store
                        .active_trades()
                        .await?
                        .into_iter()
                        .find(|t| t.id == id)
                        .ok_or_else(|| sentinel::BotError::TradeNotFound(id.clone()))?;
                    let quote = app.oracle()?.resolve_quote(&open.symbol).await?;
                    open.trade_type.exit_price(&quote)
                }
            };
            let entry = app.manual().close(&id, exit_price).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }
    Ok(())
}

async fn history(app: &App, action: HistoryAction) -> anyhow::Result<()> {
    match action {
        HistoryAction::Show => {
            let history = app.store.win_history().await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        HistoryAction::Clear => app.manual().clear_history().await?,
    }
    Ok(())
}
