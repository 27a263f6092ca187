use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Cash vs. real exchange execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    #[default]
    Simulation,
    Live,
}

impl TradingMode {
    pub fn is_live(self) -> bool {
        self == TradingMode::Live
    }
}

/// Active signal strategy, selected in the wallet config
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyMode {
    #[default]
    Swing,
    Scalp,
    Triple,
    Flow,
    Sniper,
}

impl StrategyMode {
    /// Gross take-profit target in percent for regular trades
    pub fn profit_target_pct(self) -> f64 {
        match self {
            StrategyMode::Scalp => 0.50,
            _ => 1.25,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::Swing => "SWING",
            StrategyMode::Scalp => "SCALP",
            StrategyMode::Triple => "TRIPLE",
            StrategyMode::Flow => "FLOW",
            StrategyMode::Sniper => "SNIPER",
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    #[default]
    Long,
    Short,
}

impl TradeType {
    /// +1 for LONG, -1 for SHORT
    pub fn sign(self) -> f64 {
        match self {
            TradeType::Long => 1.0,
            TradeType::Short => -1.0,
        }
    }

    /// Order side that closes this exposure
    pub fn close_side(self) -> OrderSide {
        match self {
            TradeType::Long => OrderSide::Sell,
            TradeType::Short => OrderSide::Buy,
        }
    }

    /// Spread-aware fill used when opening: longs buy the ask, shorts sell into the bid
    pub fn entry_price(self, quote: &MarketQuote) -> f64 {
        match self {
            TradeType::Long => quote.ask,
            TradeType::Short => quote.bid,
        }
    }

    /// Spread-aware fill used when closing: longs sell into the bid, shorts buy the ask
    pub fn exit_price(self, quote: &MarketQuote) -> f64 {
        match self {
            TradeType::Long => quote.bid,
            TradeType::Short => quote.ask,
        }
    }
}

impl std::str::FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(TradeType::Long),
            "SHORT" => Ok(TradeType::Short),
            other => Err(format!("unknown trade type '{}', expected LONG or SHORT", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

/// Discrete signal produced by the evaluator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Signal {
    pub fn is_buy(self) -> bool {
        matches!(self, Signal::StrongBuy | Signal::Buy)
    }
}

/// Persisted wallet configuration, one per deployment.
///
/// Fields this crate doesn't know about are kept in `extra` so that a
/// rewrite never drops settings owned by other writers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    #[serde(default = "default_balance")]
    pub initial_balance: f64,
    #[serde(default = "default_balance")]
    pub current_balance: f64,
    #[serde(default)]
    pub allocated_capital: f64,
    #[serde(default = "default_risk")]
    pub risk_percentage: f64,
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub strategy: StrategyMode,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default = "default_whale_threshold")]
    pub whale_threshold: f64,
    #[serde(default = "default_true")]
    pub is_bot_active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_balance() -> f64 {
    1000.0
}

fn default_risk() -> f64 {
    10.0
}

fn default_whale_threshold() -> f64 {
    150_000.0
}

fn default_true() -> bool {
    true
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_balance(),
            current_balance: default_balance(),
            allocated_capital: 0.0,
            risk_percentage: default_risk(),
            trading_mode: TradingMode::Simulation,
            strategy: StrategyMode::Swing,
            timeframe: None,
            whale_threshold: default_whale_threshold(),
            is_bot_active: true,
            extra: Map::new(),
        }
    }
}

/// An open position. Regular and sniper trades live in separate collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub trade_type: TradeType,
    pub entry_price: f64,
    #[serde(default)]
    pub invested_amount: f64,
    /// Base-asset units, needed to size the closing SELL
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub strategy: Option<StrategyMode>,
    #[serde(default)]
    pub mode: TradingMode,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Fee actually charged at entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_fee: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        trade_type: TradeType,
        entry_price: f64,
        invested_amount: f64,
        quantity: f64,
        strategy: StrategyMode,
        mode: TradingMode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            trade_type,
            entry_price,
            invested_amount,
            quantity,
            strategy: Some(strategy),
            mode,
            timestamp,
            target_profit: None,
            stop_loss: None,
            order_id: None,
            entry_fee: None,
            extra: Map::new(),
        }
    }

    /// Price-return percent for an exit at `exit_price` (sign flipped for SHORT)
    pub fn pnl_pct(&self, exit_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.trade_type.sign() * (exit_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Base quantity to sell on exit; older records without a quantity derive it
    pub fn effective_quantity(&self) -> f64 {
        if self.quantity > 0.0 {
            self.quantity
        } else if self.entry_price > 0.0 {
            self.invested_amount / self.entry_price
        } else {
            0.0
        }
    }
}

/// Closed trade record, newest first, capped at 50
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WinHistoryEntry {
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub trade_type: TradeType,
    #[serde(default)]
    pub strategy: Option<StrategyMode>,
    pub entry_price: f64,
    pub exit_price: f64,
    #[serde(default)]
    pub invested_amount: f64,
    /// Net percent
    pub pnl: f64,
    /// Net USD
    pub profit_usd: f64,
    #[serde(default)]
    pub fees: f64,
    pub timestamp: DateTime<Utc>,
}

/// Best-effort quote for one evaluation, never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketQuote {
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
}

impl MarketQuote {
    /// Last-trade-only quote: no book, so bid = ask = price
    pub fn from_last(price: f64) -> Self {
        Self {
            price,
            bid: price,
            ask: price,
        }
    }
}

/// OHLCV candlestick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Resting depth as (price, quantity) levels, best first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}
