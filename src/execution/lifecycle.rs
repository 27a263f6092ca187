use super::gateway::{OrderExecutor, OrderRequest};
use super::price_oracle::QuoteProvider;
use crate::api::{MarketData, TelegramNotifier};
use crate::discovery::build_universe;
use crate::models::{
    OrderSide, StrategyMode, Trade, TradeType, WalletConfig, WinHistoryEntry,
};
use crate::persistence::Store;
use crate::risk::{entry_fee, settle_close, size_entry};
use crate::strategy::{strategy_for, MarketSnapshot, Strategy};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Depth levels fetched for order-flow evaluation
const BOOK_DEPTH: usize = 20;

/// Outcome of one scan cycle
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub active_count: usize,
    pub new_alerts: Vec<String>,
}

/// Local changes made during one cycle, written back at the end
#[derive(Default)]
struct CycleState {
    /// Working view of open trades
    open: Vec<Trade>,
    added: Vec<Trade>,
    /// Removed from the collection this cycle, as they were when opened
    closed_trades: Vec<Trade>,
    /// Closed this cycle, oldest first
    closed: Vec<WinHistoryEntry>,
    balance_delta: f64,
    alerts: Vec<String>,
}

/// Runs the scan cycle: exits for open trades, entries for the rest.
///
/// Symbols are processed one after another. A failure on one symbol is
/// logged and skipped; only store failures abort the cycle.
pub struct TradeLifecycle {
    store: Store,
    market: Arc<dyn MarketData>,
    quotes: Arc<dyn QuoteProvider>,
    executor: Arc<dyn OrderExecutor>,
    notifier: TelegramNotifier,
    universe_size: usize,
    min_quote_volume: f64,
}

impl TradeLifecycle {
    pub fn new(
        store: Store,
        market: Arc<dyn MarketData>,
        quotes: Arc<dyn QuoteProvider>,
        executor: Arc<dyn OrderExecutor>,
        notifier: TelegramNotifier,
    ) -> Self {
        Self {
            store,
            market,
            quotes,
            executor,
            notifier,
            universe_size: 20,
            min_quote_volume: 10_000_000.0,
        }
    }

    /// Number of symbols scanned and their minimum 24h quote volume
    pub fn with_universe(mut self, size: usize, min_quote_volume: f64) -> Self {
        self.universe_size = size;
        self.min_quote_volume = min_quote_volume;
        self
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(None).await
    }

    /// Run one cycle
    ///
    /// # Arguments
    /// * `timestamp` - Optional clock override. If None, uses Utc::now()
    pub async fn run_cycle_at(&self, timestamp: Option<DateTime<Utc>>) -> Result<CycleReport> {
        let now = timestamp.unwrap_or_else(Utc::now);

        let wallet = self.store.load_wallet().await?;
        let active = self.store.active_trades().await?;

        let scanning = wallet.is_bot_active && wallet.strategy != StrategyMode::Sniper;
        let strategy = if scanning {
            strategy_for(wallet.strategy, wallet.timeframe.as_deref())
        } else {
            None
        };

        tracing::info!(
            "🧠 STRATEGY: {} | TARGET: {}% | MODE: {:?} | OPEN: {}",
            wallet.strategy,
            wallet.strategy.profit_target_pct(),
            wallet.trading_mode,
            active.len()
        );

        let symbols = if scanning {
            build_universe(
                self.market.as_ref(),
                self.universe_size,
                self.min_quote_volume,
                &active,
            )
            .await
        } else {
            if !wallet.is_bot_active {
                tracing::info!("⏸️  Bot paused: monitoring open trades only");
            }
            let mut open_symbols: Vec<String> = Vec::new();
            for trade in &active {
                if !open_symbols.contains(&trade.symbol) {
                    open_symbols.push(trade.symbol.clone());
                }
            }
            open_symbols
        };

        let mut state = CycleState {
            open: active,
            ..Default::default()
        };
        let mut working_wallet = wallet.clone();

        for symbol in &symbols {
            let open_trade = state.open.iter().find(|t| &t.symbol == symbol).cloned();

            let result = match (open_trade, strategy.as_deref()) {
                (Some(trade), _) => self.check_exit(&trade, &wallet, &mut state, now).await,
                (None, Some(strategy)) => {
                    self.check_entry(symbol, strategy, &mut working_wallet, &mut state, now)
                        .await
                }
                (None, None) => Ok(()),
            };

            if let Err(e) = result {
                if e.is_capital() {
                    tracing::info!(symbol = %symbol, "Entry skipped: {}", e);
                } else {
                    tracing::warn!(symbol = %symbol, "⚠️  Skipped this cycle: {}", e);
                }
            }
        }

        let active_count = self.persist(&state, now).await?;

        tracing::info!(
            "✅ Cycle complete: {} opened, {} closed, {} active",
            state.added.len(),
            state.closed_trades.len(),
            active_count
        );

        Ok(CycleReport {
            active_count,
            new_alerts: state.alerts,
        })
    }

    async fn persist(&self, state: &CycleState, now: DateTime<Utc>) -> Result<usize> {
        let active_count = if state.added.is_empty() && state.closed_trades.is_empty() {
            self.store.active_trades().await?.len()
        } else {
            self.store
                .commit_active(&state.added, &state.closed_trades, state.balance_delta)
                .await?
                .len()
        };

        if state.balance_delta != 0.0 {
            tracing::info!("💰 Wallet balance {:+.2}", state.balance_delta);
        }

        let newest_first: Vec<WinHistoryEntry> = state.closed.iter().rev().cloned().collect();
        self.store.push_history(&newest_first).await?;
        self.store.write_heartbeat(now).await?;

        Ok(active_count)
    }

    async fn check_exit(
        &self,
        trade: &Trade,
        wallet: &WalletConfig,
        state: &mut CycleState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let quote = self.quotes.resolve_quote(&trade.symbol).await?;
        let exit_price = trade.trade_type.exit_price(&quote);
        let pnl = trade.pnl_pct(exit_price);
        let target = trade.strategy.unwrap_or(wallet.strategy).profit_target_pct();

        if pnl < target {
            tracing::debug!(
                symbol = %trade.symbol,
                pnl = pnl,
                target = target,
                "Holding position"
            );
            return Ok(());
        }

        let live = trade.mode.is_live();
        let quantity = trade.effective_quantity();
        let request = match trade.trade_type.close_side() {
            OrderSide::Sell => OrderRequest::sell(&trade.symbol, quantity, exit_price, live),
            OrderSide::Buy => OrderRequest::buy(&trade.symbol, quantity * exit_price, exit_price, live),
        };
        let report = self.executor.execute(request).await?;

        // Live closes are booked at the real fill, not the quote
        let exit_price = if live { report.avg_price } else { exit_price };
        let settlement = settle_close(trade, exit_price);
        if !live {
            state.balance_delta += settlement.net_return;
        }

        state.closed.push(WinHistoryEntry {
            symbol: trade.symbol.clone(),
            trade_type: trade.trade_type,
            strategy: trade.strategy,
            entry_price: trade.entry_price,
            exit_price,
            invested_amount: trade.invested_amount,
            pnl: settlement.net_pnl_pct,
            profit_usd: settlement.net_profit,
            fees: settlement.fees,
            timestamp: now,
        });
        state.closed_trades.push(trade.clone());
        state.open.retain(|t| t.id != trade.id);

        let alert = format!(
            "WIN {} {:+.2}% (${:.2})",
            trade.symbol, settlement.net_pnl_pct, settlement.net_profit
        );
        tracing::info!(
            symbol = %trade.symbol,
            exit_price = exit_price,
            "💰 {}",
            alert
        );
        self.notifier.notify(format!(
            "💰 *TAKE PROFIT* ✅\n\n💎 *Coin:* {}\n📈 Gross: {:+.2}%\n💵 Net: {:+.2}% (${:.2})\n💸 Fees: ${:.3}",
            trade.symbol.trim_end_matches("USDT"),
            settlement.pnl_pct,
            settlement.net_pnl_pct,
            settlement.net_profit,
            settlement.fees
        ));
        state.alerts.push(alert);

        Ok(())
    }

    async fn fetch_snapshot(&self, symbol: &str, strategy: &dyn Strategy) -> Result<MarketSnapshot> {
        let req = strategy.requirements();
        let mut snapshot = MarketSnapshot::default();

        if let Some(interval) = &req.interval {
            snapshot.candles = self.market.klines(symbol, interval, req.candle_limit).await?;
        }
        for interval in &req.confirmations {
            let candles = self.market.klines(symbol, interval, req.candle_limit).await?;
            snapshot.confirmations.push((interval.clone(), candles));
        }
        if req.order_book {
            snapshot.order_book = Some(self.market.order_book(symbol, BOOK_DEPTH).await?);
        }

        Ok(snapshot)
    }

    async fn check_entry(
        &self,
        symbol: &str,
        strategy: &dyn Strategy,
        wallet: &mut WalletConfig,
        state: &mut CycleState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = self.fetch_snapshot(symbol, strategy).await?;
        let evaluation = strategy.evaluate(&snapshot);

        if !evaluation.signal.is_buy() {
            tracing::debug!(symbol = %symbol, label = %evaluation.label, "No entry");
            return Ok(());
        }

        let invested = match size_entry(wallet) {
            Ok(invested) => invested,
            Err(rejection) => {
                tracing::info!(symbol = %symbol, "Entry rejected: {}", rejection);
                return Ok(());
            }
        };

        let quote = self.quotes.resolve_quote(symbol).await?;
        let live = wallet.trading_mode.is_live();

        // Longs are bought from the ask
        let report = self
            .executor
            .execute(OrderRequest::buy(symbol, invested, quote.ask, live))
            .await?;

        let fee = entry_fee(invested);
        let mut trade = Trade::new(
            symbol,
            TradeType::Long,
            report.avg_price,
            invested,
            report.executed_qty,
            wallet.strategy,
            wallet.trading_mode,
            now,
        );
        trade.entry_fee = Some(fee);
        trade.order_id = Some(report.order_id);

        if !live {
            wallet.current_balance -= invested + fee;
            state.balance_delta -= invested + fee;
        }

        let alert = format!("{} {} @ {}", evaluation.label, symbol, trade.entry_price);
        tracing::info!(
            symbol = %symbol,
            price = trade.entry_price,
            invested = invested,
            "🔵 ENTRY ({}): {}",
            strategy.name(),
            evaluation.label
        );
        self.notifier.notify(format!(
            "🔵 *ENTRY ({})* ⚡\n\n💎 *Coin:* {}\n🎯 Signal: {}\n💰 Price: ${}\n💸 Invested: ${:.2}\n📉 Fee: -${:.3}",
            wallet.strategy,
            symbol.trim_end_matches("USDT"),
            evaluation.label,
            trade.entry_price,
            invested,
            fee
        ));

        state.alerts.push(alert);
        state.open.push(trade.clone());
        state.added.push(trade);

        Ok(())
    }
}
