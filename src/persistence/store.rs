use super::{reconcile, KeyValueStore, MemoryStore};
use crate::models::{Trade, TradingMode, WalletConfig, WinHistoryEntry};
use crate::{BotError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Closed-trade history keeps only the newest entries
pub const HISTORY_CAP: usize = 50;

pub mod keys {
    pub const ACTIVE_TRADES: &str = "sentinel_active_trades";
    pub const SNIPER_TRADES: &str = "sentinel_sniper_trades";
    pub const WALLET_CONFIG: &str = "sentinel_wallet_config";
    pub const WIN_HISTORY: &str = "sentinel_win_history";
    pub const SNIPER_COOLDOWN: &str = "sentinel_sniper_cooldown";
    pub const LAST_HEARTBEAT: &str = "sentinel_last_heartbeat";
}

/// Typed access to the shared wallet and trade collections.
///
/// Every write is a whole-value overwrite. Writers that touch a collection
/// other processes may also be changing go through the `*_reconciled` and
/// `adjust_balance` helpers, which re-read right before writing.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KeyValueStore>,
    default_mode: TradingMode,
}

impl Store {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            default_mode: TradingMode::Simulation,
        }
    }

    /// Fresh in-memory store
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Trading mode assumed for a wallet that has never been saved
    pub fn with_default_mode(mut self, mode: TradingMode) -> Self {
        self.default_mode = mode;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
            _ => Ok(None),
        }
    }

    async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw).await
    }

    // Wallet

    pub async fn load_wallet(&self) -> Result<WalletConfig> {
        match self.get_json(keys::WALLET_CONFIG).await? {
            Some(wallet) => Ok(wallet),
            None => Ok(WalletConfig {
                trading_mode: self.default_mode,
                ..Default::default()
            }),
        }
    }

    pub async fn save_wallet(&self, wallet: &WalletConfig) -> Result<()> {
        self.set_json(keys::WALLET_CONFIG, wallet).await
    }

    /// Apply a partial update, keeping every field the patch leaves out
    pub async fn merge_wallet(&self, patch: Value) -> Result<WalletConfig> {
        let Value::Object(patch) = patch else {
            return Err(BotError::InvalidData("wallet patch must be a JSON object".into()));
        };

        let current = self.load_wallet().await?;
        let mut merged = match serde_json::to_value(&current)? {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key, value);
        }

        let wallet: WalletConfig = serde_json::from_value(Value::Object(merged))?;
        self.save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Restart the wallet at `balance`; strategy and other settings survive
    pub async fn reset_wallet(&self, balance: f64) -> Result<WalletConfig> {
        let mut wallet = self.load_wallet().await?;
        wallet.initial_balance = balance;
        wallet.current_balance = balance;
        wallet.allocated_capital = balance;
        self.save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Add `delta` to the persisted balance, re-reading it first so changes
    /// made since the caller's snapshot are kept. A debit larger than the
    /// balance fails and writes nothing.
    pub async fn adjust_balance(&self, delta: f64) -> Result<WalletConfig> {
        let mut wallet = self.load_wallet().await?;
        if delta != 0.0 {
            let next = wallet.current_balance + delta;
            if next < 0.0 {
                return Err(BotError::InsufficientFunds {
                    required: -delta,
                    available: wallet.current_balance,
                });
            }
            wallet.current_balance = next;
            self.save_wallet(&wallet).await?;
        }
        Ok(wallet)
    }

    // Trade collections

    pub async fn active_trades(&self) -> Result<Vec<Trade>> {
        Ok(self.get_json(keys::ACTIVE_TRADES).await?.unwrap_or_default())
    }

    pub async fn save_active_trades(&self, trades: &[Trade]) -> Result<()> {
        self.set_json(keys::ACTIVE_TRADES, trades).await
    }

    pub async fn sniper_trades(&self) -> Result<Vec<Trade>> {
        Ok(self.get_json(keys::SNIPER_TRADES).await?.unwrap_or_default())
    }

    pub async fn save_sniper_trades(&self, trades: &[Trade]) -> Result<()> {
        self.set_json(keys::SNIPER_TRADES, trades).await
    }

    pub async fn clear_sniper_trades(&self) -> Result<()> {
        self.save_sniper_trades(&[]).await
    }

    /// Persist opened and closed regular trades together with the balance
    /// change they imply. See [`Store::commit`].
    pub async fn commit_active(
        &self,
        added: &[Trade],
        closed: &[Trade],
        balance_delta: f64,
    ) -> Result<Vec<Trade>> {
        self.commit(keys::ACTIVE_TRADES, added, closed, balance_delta)
            .await
    }

    pub async fn commit_sniper(
        &self,
        added: &[Trade],
        closed: &[Trade],
        balance_delta: f64,
    ) -> Result<Vec<Trade>> {
        self.commit(keys::SNIPER_TRADES, added, closed, balance_delta)
            .await
    }

    /// Trade collection first, balance second.
    ///
    /// A failed collection write leaves both untouched. A failed balance
    /// write puts the collection back the way it was before returning the
    /// error, so the same close is never credited twice and an open is never
    /// left without its debit.
    async fn commit(
        &self,
        key: &str,
        added: &[Trade],
        closed: &[Trade],
        balance_delta: f64,
    ) -> Result<Vec<Trade>> {
        let closed_ids: Vec<String> = closed.iter().map(|t| t.id.clone()).collect();
        let merged = self.reconcile_key(key, added, &closed_ids).await?;

        if balance_delta != 0.0 {
            if let Err(e) = self.adjust_balance(balance_delta).await {
                let added_ids: Vec<String> = added.iter().map(|t| t.id.clone()).collect();
                if let Err(revert) = self.reconcile_key(key, closed, &added_ids).await {
                    tracing::error!(
                        "❌ Balance write failed ({}) and {} could not be restored: {}",
                        e,
                        key,
                        revert
                    );
                }
                return Err(e);
            }
        }

        Ok(merged)
    }

    /// Claim the single sniper slot for `trade` and debit its cost.
    ///
    /// Returns false without writing anything when another sniper trade is
    /// already persisted.
    pub async fn open_sniper(&self, trade: &Trade, debit: f64) -> Result<bool> {
        let baseline = self.sniper_trades().await?;
        if baseline.iter().any(|t| t.id != trade.id) {
            return Ok(false);
        }
        self.commit_sniper(std::slice::from_ref(trade), &[], -debit)
            .await?;
        Ok(true)
    }

    /// Re-read `key` and write back with only our own deltas
    async fn reconcile_key(&self, key: &str, added: &[Trade], removed: &[String]) -> Result<Vec<Trade>> {
        let baseline: Vec<Trade> = self.get_json(key).await?.unwrap_or_default();
        let merged = reconcile(baseline, added, removed);
        self.set_json(key, &merged).await?;
        Ok(merged)
    }

    // History

    pub async fn win_history(&self) -> Result<Vec<WinHistoryEntry>> {
        Ok(self.get_json(keys::WIN_HISTORY).await?.unwrap_or_default())
    }

    /// Prepend `entries` (already newest first) and evict beyond the cap
    pub async fn push_history(&self, entries: &[WinHistoryEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut history = entries.to_vec();
        history.extend(self.win_history().await?);
        history.truncate(HISTORY_CAP);
        self.set_json(keys::WIN_HISTORY, &history).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.set_json::<[WinHistoryEntry]>(keys::WIN_HISTORY, &[]).await
    }

    // Timestamps

    /// Close time of the last sniper trade, stored as epoch millis
    pub async fn sniper_cooldown(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.backend.get(keys::SNIPER_COOLDOWN).await? else {
            return Ok(None);
        };
        let millis: i64 = raw
            .trim()
            .trim_matches('"')
            .parse()
            .map_err(|_| BotError::InvalidData(format!("bad cooldown timestamp: {}", raw)))?;
        Ok(Utc.timestamp_millis_opt(millis).single())
    }

    pub async fn set_sniper_cooldown(&self, at: DateTime<Utc>) -> Result<()> {
        self.backend
            .set(keys::SNIPER_COOLDOWN, at.timestamp_millis().to_string())
            .await
    }

    pub async fn heartbeat(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.backend.get(keys::LAST_HEARTBEAT).await? else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(raw.trim().trim_matches('"'))
            .map_err(|e| BotError::InvalidData(format!("bad heartbeat: {}", e)))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    pub async fn write_heartbeat(&self, at: DateTime<Utc>) -> Result<()> {
        self.backend.set(keys::LAST_HEARTBEAT, at.to_rfc3339()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StrategyMode, TradeType};
    use crate::persistence::scripted::ScriptedStore;
    use serde_json::json;

    fn entry(symbol: &str) -> WinHistoryEntry {
        WinHistoryEntry {
            symbol: symbol.to_string(),
            trade_type: TradeType::Long,
            strategy: Some(StrategyMode::Swing),
            entry_price: 100.0,
            exit_price: 101.5,
            invested_amount: 100.0,
            pnl: 1.3,
            profit_usd: 1.3,
            fees: 0.2,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_wallet_uses_defaults() {
        let store = Store::memory().with_default_mode(TradingMode::Live);
        let wallet = store.load_wallet().await.unwrap();
        assert_eq!(wallet.current_balance, 1000.0);
        assert_eq!(wallet.trading_mode, TradingMode::Live);
    }

    #[tokio::test]
    async fn test_merge_preserves_unspecified_fields() {
        let store = Store::memory();
        store
            .merge_wallet(json!({"riskPercentage": 25, "dashboardTheme": "dark"}))
            .await
            .unwrap();
        let wallet = store
            .merge_wallet(json!({"strategy": "FLOW"}))
            .await
            .unwrap();

        assert_eq!(wallet.risk_percentage, 25.0);
        assert_eq!(wallet.strategy, StrategyMode::Flow);
        assert_eq!(wallet.extra["dashboardTheme"], "dark");
        assert_eq!(wallet.current_balance, 1000.0);
    }

    #[tokio::test]
    async fn test_merge_rejects_non_object() {
        let store = Store::memory();
        assert!(store.merge_wallet(json!([1, 2])).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_keeps_strategy() {
        let store = Store::memory();
        store.merge_wallet(json!({"strategy": "SCALP"})).await.unwrap();
        let wallet = store.reset_wallet(250.0).await.unwrap();
        assert_eq!(wallet.initial_balance, 250.0);
        assert_eq!(wallet.current_balance, 250.0);
        assert_eq!(wallet.strategy, StrategyMode::Scalp);
    }

    #[tokio::test]
    async fn test_history_newest_first_and_capped() {
        let store = Store::memory();
        for i in 0..60 {
            store.push_history(&[entry(&format!("T{}USDT", i))]).await.unwrap();
        }
        let history = store.win_history().await.unwrap();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].symbol, "T59USDT");
        assert_eq!(history[49].symbol, "T10USDT");
    }

    #[tokio::test]
    async fn test_cooldown_and_heartbeat_timestamps() {
        let store = Store::memory();
        assert!(store.sniper_cooldown().await.unwrap().is_none());

        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        store.set_sniper_cooldown(now).await.unwrap();
        assert_eq!(store.sniper_cooldown().await.unwrap(), Some(now));

        store.write_heartbeat(now).await.unwrap();
        assert_eq!(store.heartbeat().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_adjust_balance_rereads() {
        let store = Store::memory();
        store.reset_wallet(500.0).await.unwrap();
        // Simulates a concurrent writer touching the balance between reads
        store.merge_wallet(json!({"currentBalance": 400.0})).await.unwrap();

        let wallet = store.adjust_balance(-100.0).await.unwrap();
        assert_eq!(wallet.current_balance, 300.0);
    }

    #[tokio::test]
    async fn test_clear_sniper_trades() {
        let store = Store::memory();
        let trade = Trade::new(
            "BTCUSDT",
            TradeType::Long,
            50000.0,
            100.0,
            0.002,
            StrategyMode::Sniper,
            TradingMode::Simulation,
            Utc::now(),
        );
        store.save_sniper_trades(&[trade]).await.unwrap();
        assert_eq!(store.sniper_trades().await.unwrap().len(), 1);

        store.clear_sniper_trades().await.unwrap();
        assert!(store.sniper_trades().await.unwrap().is_empty());
    }

    fn sniper_trade(symbol: &str) -> Trade {
        Trade::new(
            symbol,
            TradeType::Long,
            100.0,
            100.0,
            1.0,
            StrategyMode::Sniper,
            TradingMode::Simulation,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_overdraft_is_rejected_not_clamped() {
        let store = Store::memory();
        store.reset_wallet(50.0).await.unwrap();

        let err = store.adjust_balance(-50.05).await.unwrap_err();
        assert!(matches!(err, BotError::InsufficientFunds { .. }));
        assert!(err.is_capital());
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 50.0);

        let wallet = store.adjust_balance(-50.0).await.unwrap();
        assert_eq!(wallet.current_balance, 0.0);
    }

    #[tokio::test]
    async fn test_commit_restores_trades_when_balance_write_fails() {
        let backend = Arc::new(ScriptedStore::new());
        let store = Store::new(backend.clone());
        store.reset_wallet(1000.0).await.unwrap();

        let open = sniper_trade("BTCUSDT");
        store.save_active_trades(&[open.clone()]).await.unwrap();
        let opened = sniper_trade("ETHUSDT");

        backend.fail_next_sets(keys::WALLET_CONFIG, 1);
        let result = store
            .commit_active(std::slice::from_ref(&opened), std::slice::from_ref(&open), 5.0)
            .await;
        assert!(result.is_err());

        // Neither the close nor the open survived without its money
        let active = store.active_trades().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 1000.0);

        // Retrying books it exactly once
        store
            .commit_active(std::slice::from_ref(&opened), std::slice::from_ref(&open), 5.0)
            .await
            .unwrap();
        let active = store.active_trades().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, opened.id);
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 1005.0);
    }

    #[tokio::test]
    async fn test_failed_trade_write_leaves_balance_alone() {
        let backend = Arc::new(ScriptedStore::new());
        let store = Store::new(backend.clone());
        store.reset_wallet(1000.0).await.unwrap();
        let open = sniper_trade("BTCUSDT");
        store.save_sniper_trades(&[open.clone()]).await.unwrap();

        backend.fail_next_sets(keys::SNIPER_TRADES, 1);
        assert!(store
            .commit_sniper(&[], std::slice::from_ref(&open), 101.0)
            .await
            .is_err());
        assert_eq!(store.sniper_trades().await.unwrap().len(), 1);
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 1000.0);
    }

    #[tokio::test]
    async fn test_open_sniper_respects_existing_trade() {
        let store = Store::memory();
        store.reset_wallet(1000.0).await.unwrap();
        store
            .save_sniper_trades(&[sniper_trade("ETHUSDT")])
            .await
            .unwrap();

        let claimed = store
            .open_sniper(&sniper_trade("BTCUSDT"), 100.1)
            .await
            .unwrap();
        assert!(!claimed);
        assert_eq!(store.sniper_trades().await.unwrap().len(), 1);
        assert_eq!(store.load_wallet().await.unwrap().current_balance, 1000.0);

        store.clear_sniper_trades().await.unwrap();
        assert!(store
            .open_sniper(&sniper_trade("BTCUSDT"), 100.1)
            .await
            .unwrap());
        assert!((store.load_wallet().await.unwrap().current_balance - 899.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let store = Store::memory();
        store.push_history(&[entry("BTCUSDT")]).await.unwrap();
        store.clear_history().await.unwrap();
        assert!(store.win_history().await.unwrap().is_empty());
    }
}
