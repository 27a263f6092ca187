use crate::models::{Trade, WalletConfig};
use crate::BotError;

/// Exchange taker fee charged on both entry and exit
pub const FEE_RATE: f64 = 0.001;

/// Entries smaller than this are not worth the fees
pub const MIN_ENTRY_USD: f64 = 6.0;

/// The sniper stands down below this balance
pub const SNIPER_MIN_BALANCE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SizingRejection {
    TooSmall { invested: f64 },
    InsufficientBalance { required: f64, available: f64 },
    BelowSniperFloor { balance: f64 },
}

impl std::fmt::Display for SizingRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingRejection::TooSmall { invested } => {
                write!(f, "${:.2} is below the ${:.2} entry floor", invested, MIN_ENTRY_USD)
            }
            SizingRejection::InsufficientBalance {
                required,
                available,
            } => write!(f, "needs ${:.2}, balance is ${:.2}", required, available),
            SizingRejection::BelowSniperFloor { balance } => write!(
                f,
                "balance ${:.2} is below the ${:.0} sniper floor",
                balance, SNIPER_MIN_BALANCE
            ),
        }
    }
}

impl From<SizingRejection> for BotError {
    fn from(rejection: SizingRejection) -> Self {
        match rejection {
            SizingRejection::TooSmall { invested } => BotError::BelowMinNotional {
                notional: invested,
                minimum: MIN_ENTRY_USD,
            },
            SizingRejection::InsufficientBalance {
                required,
                available,
            } => BotError::InsufficientFunds {
                required,
                available,
            },
            SizingRejection::BelowSniperFloor { balance } => BotError::InsufficientFunds {
                required: SNIPER_MIN_BALANCE,
                available: balance,
            },
        }
    }
}

/// Capital that position size is computed against.
///
/// LIVE wallets size against the allocated ceiling; an unset ceiling falls
/// back to the simulated balance.
pub fn capital_base(wallet: &WalletConfig) -> f64 {
    if wallet.trading_mode.is_live() && wallet.allocated_capital > 0.0 {
        wallet.allocated_capital
    } else {
        wallet.current_balance
    }
}

pub fn entry_fee(invested: f64) -> f64 {
    invested * FEE_RATE
}

/// USD to commit to a new regular entry
pub fn size_entry(wallet: &WalletConfig) -> Result<f64, SizingRejection> {
    let invested = capital_base(wallet) * wallet.risk_percentage / 100.0;

    if invested < MIN_ENTRY_USD {
        return Err(SizingRejection::TooSmall { invested });
    }

    if !wallet.trading_mode.is_live() {
        let required = invested + entry_fee(invested);
        if required > wallet.current_balance {
            return Err(SizingRejection::InsufficientBalance {
                required,
                available: wallet.current_balance,
            });
        }
    }

    Ok(invested)
}

/// USD to commit to a sniper entry; sized on the wallet balance alone
pub fn size_sniper_entry(wallet: &WalletConfig) -> Result<f64, SizingRejection> {
    let balance = wallet.current_balance;
    if balance < SNIPER_MIN_BALANCE {
        return Err(SizingRejection::BelowSniperFloor { balance });
    }

    let invested = balance * wallet.risk_percentage / 100.0;
    if !wallet.trading_mode.is_live() {
        let required = invested + entry_fee(invested);
        if required > balance {
            return Err(SizingRejection::InsufficientBalance {
                required,
                available: balance,
            });
        }
    }

    Ok(invested)
}

/// Money flow of closing a trade at `exit_price`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub pnl_pct: f64,
    pub gross_return: f64,
    pub close_fee: f64,
    /// Credited back to the wallet
    pub net_return: f64,
    /// After both fees
    pub net_profit: f64,
    pub net_pnl_pct: f64,
    pub fees: f64,
}

pub fn settle_close(trade: &Trade, exit_price: f64) -> Settlement {
    let pnl_pct = trade.pnl_pct(exit_price);
    let invested = trade.invested_amount;

    let gross_return = invested * (1.0 + pnl_pct / 100.0);
    let close_fee = gross_return * FEE_RATE;
    let net_return = gross_return - close_fee;

    // Records written before the entry fee was stored get the estimate
    let open_fee = trade.entry_fee.unwrap_or_else(|| entry_fee(invested));
    let net_profit = net_return - invested - open_fee;
    let net_pnl_pct = if invested > 0.0 {
        net_profit / invested * 100.0
    } else {
        0.0
    };

    Settlement {
        pnl_pct,
        gross_return,
        close_fee,
        net_return,
        net_profit,
        net_pnl_pct,
        fees: open_fee + close_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StrategyMode, TradeType, TradingMode};
    use chrono::Utc;

    fn wallet(balance: f64, risk: f64) -> WalletConfig {
        WalletConfig {
            current_balance: balance,
            risk_percentage: risk,
            ..Default::default()
        }
    }

    #[test]
    fn test_small_wallet_rejected() {
        let result = size_entry(&wallet(50.0, 10.0));
        assert_eq!(result, Err(SizingRejection::TooSmall { invested: 5.0 }));
    }

    #[test]
    fn test_sizing_respects_risk() {
        let invested = size_entry(&wallet(1000.0, 10.0)).unwrap();
        assert_eq!(invested, 100.0);
    }

    #[test]
    fn test_full_risk_cannot_cover_fee() {
        let result = size_entry(&wallet(100.0, 100.0));
        assert!(matches!(
            result,
            Err(SizingRejection::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_live_sizes_against_allocated_capital() {
        let mut w = wallet(50.0, 10.0);
        w.trading_mode = TradingMode::Live;
        w.allocated_capital = 500.0;
        assert_eq!(capital_base(&w), 500.0);
        assert_eq!(size_entry(&w).unwrap(), 50.0);

        w.allocated_capital = 0.0;
        assert_eq!(capital_base(&w), 50.0);
    }

    #[test]
    fn test_sniper_sizing() {
        assert_eq!(size_sniper_entry(&wallet(1000.0, 10.0)), Ok(100.0));
        assert_eq!(
            size_sniper_entry(&wallet(8.0, 10.0)),
            Err(SizingRejection::BelowSniperFloor { balance: 8.0 })
        );

        // The whole balance leaves nothing for the fee
        assert!(matches!(
            size_sniper_entry(&wallet(1000.0, 100.0)),
            Err(SizingRejection::InsufficientBalance { .. })
        ));

        let mut live = wallet(1000.0, 100.0);
        live.trading_mode = TradingMode::Live;
        assert_eq!(size_sniper_entry(&live), Ok(1000.0));
    }

    #[test]
    fn test_settlement_after_target_hit() {
        let mut trade = Trade::new(
            "BTCUSDT",
            TradeType::Long,
            100.0,
            100.0,
            1.0,
            StrategyMode::Swing,
            TradingMode::Simulation,
            Utc::now(),
        );
        trade.entry_fee = Some(0.1);

        let s = settle_close(&trade, 101.5);
        assert!((s.pnl_pct - 1.5).abs() < 1e-9);
        assert!((s.gross_return - 101.5).abs() < 1e-9);
        assert!((s.close_fee - 0.1015).abs() < 1e-9);
        assert!((s.net_return - 101.3985).abs() < 1e-9);
        assert!((s.net_profit - 1.2985).abs() < 1e-9);
        assert!((s.fees - 0.2015).abs() < 1e-9);
    }

    #[test]
    fn test_legacy_trade_estimates_entry_fee() {
        let trade = Trade::new(
            "ETHUSDT",
            TradeType::Short,
            100.0,
            200.0,
            2.0,
            StrategyMode::Scalp,
            TradingMode::Simulation,
            Utc::now(),
        );
        let s = settle_close(&trade, 99.0);
        assert!((s.pnl_pct - 1.0).abs() < 1e-9);
        assert!((s.fees - (0.2 + 202.0 * FEE_RATE)).abs() < 1e-9);
    }
}
