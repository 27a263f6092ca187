use super::cvd::{CvdTracker, SniperSnapshot};
use super::Tick;
use crate::api::TelegramNotifier;
use crate::execution::{ExecutionReport, OrderExecutor, OrderRequest};
use crate::models::{StrategyMode, Trade, TradeType, WalletConfig, WinHistoryEntry};
use crate::persistence::Store;
use crate::risk::{entry_fee, settle_close, size_sniper_entry, SizingRejection};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

/// Minimum gap between the last sniper close (or open) and the next entry
pub const COOLDOWN_SECS: i64 = 300;

/// Take profit / stop loss as multiples of the entry price
pub const TAKE_PROFIT_RATIO: f64 = 1.01;
pub const STOP_LOSS_RATIO: f64 = 0.995;

/// Why a whale buy did not become an entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntrySkip {
    /// Strategy is not SNIPER or the bot is paused
    Disabled,
    /// Another tick holds the entry permit
    InFlight,
    PositionOpen,
    CoolingDown,
    Sizing(SizingRejection),
    /// Another writer recorded a sniper trade while the order was filling
    SlotTaken,
}

/// What a single tick led to
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub delta: f64,
    pub whale: bool,
    pub opened: Option<Trade>,
    pub skipped: Option<EntrySkip>,
    pub closed: Vec<WinHistoryEntry>,
}

/// Stream-driven whale sniper.
///
/// Keeps CVD state per symbol in memory; everything that must survive a
/// restart (open trade, balance, cooldown) lives in the store and is
/// re-read on every decision. Entry attempts are serialized by a
/// single-permit semaphore: a tick arriving while another entry is in
/// flight is dropped rather than queued.
pub struct CvdSniper {
    store: Store,
    executor: Arc<dyn OrderExecutor>,
    notifier: TelegramNotifier,
    trackers: Mutex<HashMap<String, CvdTracker>>,
    entry_guard: Semaphore,
    exit_guard: tokio::sync::Mutex<()>,
}

impl CvdSniper {
    pub fn new(store: Store, executor: Arc<dyn OrderExecutor>, notifier: TelegramNotifier) -> Self {
        tracing::info!("🔫 CVD SNIPER: initialized");
        Self {
            store,
            executor,
            notifier,
            trackers: Mutex::new(HashMap::new()),
            entry_guard: Semaphore::new(1),
            exit_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn trackers(&self) -> MutexGuard<'_, HashMap<String, CvdTracker>> {
        self.trackers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current CVD state for `symbol`, if any tick has been seen
    pub fn snapshot(&self, symbol: &str) -> Option<SniperSnapshot> {
        self.trackers()
            .get(&symbol.to_uppercase())
            .map(CvdTracker::snapshot)
    }

    pub async fn handle_tick(&self, tick: Tick) -> Result<TickOutcome> {
        self.handle_tick_at(tick, None).await
    }

    /// Process one aggregated trade
    ///
    /// # Arguments
    /// * `timestamp` - Optional clock override. If None, uses Utc::now()
    pub async fn handle_tick_at(
        &self,
        tick: Tick,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<TickOutcome> {
        let now = timestamp.unwrap_or_else(Utc::now);

        let delta = {
            let mut trackers = self.trackers();
            trackers
                .entry(tick.symbol.clone())
                .or_insert_with(|| CvdTracker::new(&tick.symbol))
                .record(&tick)
        };

        let mut outcome = TickOutcome {
            delta,
            ..Default::default()
        };

        outcome.closed = self.monitor_exits(&tick, now).await?;

        let wallet = self.store.load_wallet().await?;
        if delta.abs() > wallet.whale_threshold {
            outcome.whale = true;
            if let Some(tracker) = self.trackers().get_mut(&tick.symbol) {
                tracker.record_trigger();
            }
            tracing::info!(
                symbol = %tick.symbol,
                "🐋 WHALE ALERT: {} POWER: ${:.0} @ {}",
                if delta > 0.0 { "🟢 BUY" } else { "🔴 SELL" },
                delta.abs(),
                tick.price
            );

            // Long only: taker sells are alerts, never entries
            if delta > 0.0 {
                match self.try_open(&tick, &wallet, now).await? {
                    Ok(trade) => outcome.opened = Some(trade),
                    Err(skip) => outcome.skipped = Some(skip),
                }
            }
        }

        Ok(outcome)
    }

    async fn try_open(
        &self,
        tick: &Tick,
        wallet: &WalletConfig,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<Trade, EntrySkip>> {
        if wallet.strategy != StrategyMode::Sniper || !wallet.is_bot_active {
            tracing::debug!("Sniper entries disabled (strategy {})", wallet.strategy);
            return Ok(Err(EntrySkip::Disabled));
        }

        let Ok(_permit) = self.entry_guard.try_acquire() else {
            tracing::debug!(symbol = %tick.symbol, "Entry already in flight, ignoring trigger");
            return Ok(Err(EntrySkip::InFlight));
        };

        let open = self.store.sniper_trades().await?;
        if !open.is_empty() {
            tracing::debug!("Sniper already holds {}", open[0].symbol);
            return Ok(Err(EntrySkip::PositionOpen));
        }

        if let Some(last) = self.store.sniper_cooldown().await? {
            let elapsed = now - last;
            if elapsed < Duration::seconds(COOLDOWN_SECS) {
                tracing::info!(
                    "⏳ Sniper cooling down ({}s left)",
                    COOLDOWN_SECS - elapsed.num_seconds()
                );
                return Ok(Err(EntrySkip::CoolingDown));
            }
        }

        // Balance may have moved since the tick started
        let wallet = self.store.load_wallet().await?;
        let invested = match size_sniper_entry(&wallet) {
            Ok(invested) => invested,
            Err(rejection) => {
                tracing::warn!(symbol = %tick.symbol, "Sniper standing down: {}", rejection);
                return Ok(Err(EntrySkip::Sizing(rejection)));
            }
        };

        let live = wallet.trading_mode.is_live();
        let report = self
            .executor
            .execute(OrderRequest::buy(&tick.symbol, invested, tick.price, live))
            .await?;

        let fee = entry_fee(invested);
        let mut trade = Trade::new(
            &tick.symbol,
            TradeType::Long,
            report.avg_price,
            invested,
            report.executed_qty,
            StrategyMode::Sniper,
            wallet.trading_mode,
            now,
        );
        trade.target_profit = Some(report.avg_price * TAKE_PROFIT_RATIO);
        trade.stop_loss = Some(report.avg_price * STOP_LOSS_RATIO);
        trade.entry_fee = Some(fee);
        trade.order_id = Some(report.order_id.clone());

        let debit = if live { 0.0 } else { invested + fee };
        if !self.store.open_sniper(&trade, debit).await? {
            tracing::warn!(
                symbol = %trade.symbol,
                "⚠️  Sniper slot taken by another writer, dropping entry"
            );
            if live {
                self.unwind_entry(&trade, &report).await;
            }
            return Ok(Err(EntrySkip::SlotTaken));
        }
        self.store.set_sniper_cooldown(now).await?;

        tracing::info!(
            symbol = %trade.symbol,
            price = trade.entry_price,
            invested = invested,
            "🎯 SNIPER ENTRY"
        );
        self.notifier.notify(format!(
            "🎯 *SNIPER ENTRY* 🐋\n\n💎 *Coin:* {}\n💰 Price: ${}\n💸 Invested: ${:.2}\n✅ TP: ${:.2} | 🛑 SL: ${:.2}",
            trade.symbol.trim_end_matches("USDT"),
            trade.entry_price,
            invested,
            trade.target_profit.unwrap_or_default(),
            trade.stop_loss.unwrap_or_default()
        ));

        Ok(Ok(trade))
    }

    /// Sell back a live fill that could not be recorded
    async fn unwind_entry(&self, trade: &Trade, report: &ExecutionReport) {
        let request = OrderRequest::sell(
            &trade.symbol,
            report.executed_qty,
            report.avg_price,
            true,
        );
        match self.executor.execute(request).await {
            Ok(_) => tracing::info!(symbol = %trade.symbol, "↩️  Unrecorded sniper entry sold back"),
            Err(e) => tracing::error!(
                symbol = %trade.symbol,
                qty = report.executed_qty,
                "❌ Unrecorded sniper entry could not be sold back: {}",
                e
            ),
        }
    }

    /// Close any sniper trade on this symbol whose TP or SL the tick crossed
    async fn monitor_exits(&self, tick: &Tick, now: DateTime<Utc>) -> Result<Vec<WinHistoryEntry>> {
        // Another tick is already closing; the next one re-checks
        let Ok(_guard) = self.exit_guard.try_lock() else {
            return Ok(Vec::new());
        };

        let trades = self.store.sniper_trades().await?;
        let mut closed = Vec::new();

        for trade in trades.iter().filter(|t| t.symbol == tick.symbol) {
            let take_profit = trade
                .target_profit
                .unwrap_or(trade.entry_price * TAKE_PROFIT_RATIO);
            let stop_loss = trade
                .stop_loss
                .unwrap_or(trade.entry_price * STOP_LOSS_RATIO);

            let reason = if tick.price >= take_profit {
                "TAKE PROFIT"
            } else if tick.price <= stop_loss {
                "STOP LOSS"
            } else {
                continue;
            };

            let live = trade.mode.is_live();
            let report = self
                .executor
                .execute(OrderRequest::sell(
                    &trade.symbol,
                    trade.effective_quantity(),
                    tick.price,
                    live,
                ))
                .await?;
            let exit_price = if live { report.avg_price } else { tick.price };

            // Removal and credit land together or not at all
            let settlement = settle_close(trade, exit_price);
            let credit = if live { 0.0 } else { settlement.net_return };
            self.store
                .commit_sniper(&[], std::slice::from_ref(trade), credit)
                .await?;

            let entry = WinHistoryEntry {
                symbol: trade.symbol.clone(),
                trade_type: trade.trade_type,
                strategy: Some(StrategyMode::Sniper),
                entry_price: trade.entry_price,
                exit_price,
                invested_amount: trade.invested_amount,
                pnl: settlement.net_pnl_pct,
                profit_usd: settlement.net_profit,
                fees: settlement.fees,
                timestamp: now,
            };
            self.store.push_history(std::slice::from_ref(&entry)).await?;
            self.store.set_sniper_cooldown(now).await?;

            tracing::info!(
                symbol = %trade.symbol,
                exit_price = exit_price,
                net_pnl = settlement.net_pnl_pct,
                "🔫 SNIPER EXIT ({})",
                reason
            );
            self.notifier.notify(format!(
                "{} *SNIPER {}*\n\n💎 *Coin:* {}\n💰 Exit: ${}\n💵 Net: {:+.2}% (${:.2})",
                if settlement.net_profit >= 0.0 { "✅" } else { "🛑" },
                reason,
                trade.symbol.trim_end_matches("USDT"),
                exit_price,
                settlement.net_pnl_pct,
                settlement.net_profit
            ));

            closed.push(entry);
        }

        Ok(closed)
    }
}
