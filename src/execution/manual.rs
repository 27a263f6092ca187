use crate::api::TelegramNotifier;
use crate::models::{Trade, TradeType, TradingMode, WinHistoryEntry};
use crate::persistence::Store;
use crate::risk::{entry_fee, settle_close, size_entry};
use crate::{BotError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Marks a trade recorded by hand rather than by the scan cycle
pub const MANUAL_FLAG: &str = "isManual";

/// Operator-driven bookkeeping on the regular trade collection.
///
/// Nothing here places exchange orders: an open records a position at the
/// given price and debits the simulated balance, a close records the exit
/// the operator made. Both go through the same reconciled commit as the
/// scan cycle, so a cycle running concurrently keeps its own changes.
pub struct ManualTrades {
    store: Store,
    notifier: TelegramNotifier,
}

impl ManualTrades {
    pub fn new(store: Store, notifier: TelegramNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn open(&self, symbol: &str, trade_type: TradeType, price: f64) -> Result<Trade> {
        self.open_at(symbol, trade_type, price, None).await
    }

    /// Record a position sized at the wallet's risk percentage
    ///
    /// # Arguments
    /// * `timestamp` - Optional clock override. If None, uses Utc::now()
    pub async fn open_at(
        &self,
        symbol: &str,
        trade_type: TradeType,
        price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Trade> {
        if !(price.is_finite() && price > 0.0) {
            return Err(BotError::InvalidData(format!(
                "{} entry price must be positive, got {}",
                symbol, price
            )));
        }
        let now = timestamp.unwrap_or_else(Utc::now);
        let symbol = symbol.to_uppercase();

        // Manual trades spend the simulated balance whatever the wallet mode
        let mut wallet = self.store.load_wallet().await?;
        wallet.trading_mode = TradingMode::Simulation;
        let invested = size_entry(&wallet)?;
        let fee = entry_fee(invested);

        let mut trade = Trade::new(
            &symbol,
            trade_type,
            price,
            invested,
            invested / price,
            wallet.strategy,
            TradingMode::Simulation,
            now,
        );
        // Exit target follows whatever strategy is selected when it is checked
        trade.strategy = None;
        trade.entry_fee = Some(fee);
        trade.extra.insert(MANUAL_FLAG.to_string(), Value::Bool(true));

        self.store
            .commit_active(std::slice::from_ref(&trade), &[], -(invested + fee))
            .await?;

        tracing::info!(
            symbol = %trade.symbol,
            price = price,
            invested = invested,
            "✍️  MANUAL ENTRY {:?}",
            trade_type
        );
        self.notifier.notify(format!(
            "👆 *MANUAL ENTRY* ✍️\n\n💎 *Coin:* {}\n🎯 Type: {:?}\n💰 Price: ${}\n💸 Invested: ${:.2}\n📉 Fee: -${:.3}",
            trade.symbol.trim_end_matches("USDT"),
            trade_type,
            price,
            invested,
            fee
        ));

        Ok(trade)
    }

    pub async fn close(&self, id: &str, exit_price: f64) -> Result<WinHistoryEntry> {
        self.close_at(id, exit_price, None).await
    }

    /// Close the regular trade `id` at `exit_price`, credit it and record it
    pub async fn close_at(
        &self,
        id: &str,
        exit_price: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<WinHistoryEntry> {
        if !(exit_price.is_finite() && exit_price > 0.0) {
            return Err(BotError::InvalidData(format!(
                "exit price must be positive, got {}",
                exit_price
            )));
        }
        let now = timestamp.unwrap_or_else(Utc::now);

        let trade = self
            .store
            .active_trades()
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| BotError::TradeNotFound(id.to_string()))?;

        let settlement = settle_close(&trade, exit_price);
        let credit = if trade.mode.is_live() {
            0.0
        } else {
            settlement.net_return
        };
        self.store
            .commit_active(&[], std::slice::from_ref(&trade), credit)
            .await?;

        let entry = WinHistoryEntry {
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
        };
        self.store.push_history(std::slice::from_ref(&entry)).await?;

        tracing::info!(
            symbol = %trade.symbol,
            exit_price = exit_price,
            net_pnl = settlement.net_pnl_pct,
            "✍️  MANUAL EXIT"
        );
        self.notifier.notify(format!(
            "✍️ *MANUAL EXIT*\n\n💎 *Coin:* {}\n💰 Exit: ${}\n💵 Net: {:+.2}% (${:.2})",
            trade.symbol.trim_end_matches("USDT"),
            exit_price,
            settlement.net_pnl_pct,
            settlement.net_profit
        ));

        Ok(entry)
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.store.clear_history().await?;
        tracing::info!("🧹 Win history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyMode;
    use crate::persistence::keys;
    use crate::persistence::scripted::ScriptedStore;
    use serde_json::json;
    use std::sync::Arc;

    fn manual(store: &Store) -> ManualTrades {
        ManualTrades::new(store.clone(), TelegramNotifier::disabled())
    }

    #[tokio::test]
    async fn test_open_debits_risk_share_and_fee() {
        let store = Store::memory();
        let trade = manual(&store)
            .open("solusdt", TradeType::Short, 100.0)
            .await
            .unwrap();

        assert_eq!(trade.symbol, "SOLUSDT");
        assert_eq!(trade.trade_type, TradeType::Short);
        assert_eq!(trade.invested_amount, 100.0);
        assert_eq!(trade.quantity, 1.0);
        assert_eq!(trade.strategy, None);
        assert_eq!(trade.extra[MANUAL_FLAG], Value::Bool(true));

        let active = store.active_trades().await.unwrap();
        assert_eq!(active, vec![trade]);
        let wallet = store.load_wallet().await.unwrap();
        assert!((wallet.current_balance - 899.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_open_is_sized_on_balance_even_when_live() {
        let store = Store::memory();
        store
            .merge_wallet(json!({"tradingMode": "LIVE", "allocatedCapital": 5000.0}))
            .await
            .unwrap();

        let trade = manual(&store)
            .open("BTCUSDT", TradeType::Long, 50000.0)
            .await
            .unwrap();
        assert_eq!(trade.invested_amount, 100.0);
        assert_eq!(trade.mode, TradingMode::Simulation);
    }

    #[tokio::test]
    async fn test_open_rejects_overdraft() {
        let store = Store::memory();
        store
            .merge_wallet(json!({"riskPercentage": 100}))
            .await
            .unwrap();

        let err = manual(&store)
            .open("BTCUSDT", TradeType::Long, 50000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InsufficientFunds { .. }));
        assert!(store.active_trades().await.unwrap().is_empty());
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 1000.0);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_price() {
        let store = Store::memory();
        let err = manual(&store)
            .open("BTCUSDT", TradeType::Long, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_short_close_credits_falling_price() {
        let store = Store::memory();
        let trades = manual(&store);
        let trade = trades
            .open("SOLUSDT", TradeType::Short, 100.0)
            .await
            .unwrap();

        let entry = trades.close(&trade.id, 98.0).await.unwrap();

        // 2% in our favour: 102 back less a 0.102 close fee
        assert_eq!(entry.trade_type, TradeType::Short);
        assert_eq!(entry.exit_price, 98.0);
        assert!((entry.profit_usd - (101.898 - 100.1)).abs() < 1e-9);
        assert!(store.active_trades().await.unwrap().is_empty());
        assert_eq!(store.win_history().await.unwrap(), vec![entry]);

        let wallet = store.load_wallet().await.unwrap();
        assert!((wallet.current_balance - (899.9 + 101.898)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_close_keeps_other_trades() {
        let store = Store::memory();
        let bot_trade = Trade::new(
            "ADAUSDT",
            TradeType::Long,
            1.0,
            100.0,
            100.0,
            StrategyMode::Scalp,
            TradingMode::Simulation,
            Utc::now(),
        );
        store.save_active_trades(&[bot_trade.clone()]).await.unwrap();

        let trades = manual(&store);
        let trade = trades
            .open("BTCUSDT", TradeType::Long, 50000.0)
            .await
            .unwrap();
        trades.close(&trade.id, 50500.0).await.unwrap();

        assert_eq!(store.active_trades().await.unwrap(), vec![bot_trade]);
    }

    #[tokio::test]
    async fn test_close_unknown_trade() {
        let store = Store::memory();
        let err = manual(&store).close("missing", 1.0).await.unwrap_err();
        assert!(matches!(err, BotError::TradeNotFound(id) if id == "missing"));
        assert!(store.win_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_credit_keeps_trade_open() {
        let backend = Arc::new(ScriptedStore::new());
        let store = Store::new(backend.clone());
        let trades = manual(&store);
        let trade = trades
            .open("ETHUSDT", TradeType::Long, 2000.0)
            .await
            .unwrap();

        backend.fail_next_sets(keys::WALLET_CONFIG, 1);
        assert!(trades.close(&trade.id, 2100.0).await.is_err());
        assert_eq!(store.active_trades().await.unwrap(), vec![trade.clone()]);
        assert!(store.win_history().await.unwrap().is_empty());

        trades.close(&trade.id, 2100.0).await.unwrap();
        assert!(store.active_trades().await.unwrap().is_empty());
        assert_eq!(store.win_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let store = Store::memory();
        let trades = manual(&store);
        let trade = trades
            .open("BTCUSDT", TradeType::Long, 50000.0)
            .await
            .unwrap();
        trades.close(&trade.id, 49000.0).await.unwrap();
        assert_eq!(store.win_history().await.unwrap().len(), 1);

        trades.clear_history().await.unwrap();
        assert!(store.win_history().await.unwrap().is_empty());
    }
}
