// Signal evaluation: one strategy per wallet mode
pub mod flow;
pub mod signals;
pub mod triple;

use crate::indicators::BollingerBands;
use crate::models::{Candle, OrderBook, Signal, StrategyMode};

pub use flow::FlowStrategy;
pub use signals::{RsiConfig, SwingStrategy};
pub use triple::TripleStrategy;

/// Below this many candles a market is treated as too thin to evaluate
pub const MIN_CANDLES: usize = 20;

pub const LABEL_LOW_LIQUIDITY: &str = "LOW_LIQUIDITY";

/// Market data a strategy needs before it can be evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequirements {
    /// Primary candle interval (e.g. "4h"), `None` for book-only strategies
    pub interval: Option<String>,
    /// Extra intervals that must confirm the primary one
    pub confirmations: Vec<String>,
    pub candle_limit: usize,
    pub order_book: bool,
}

/// Inputs gathered for one symbol
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub candles: Vec<Candle>,
    /// (interval, candles) for each confirmation timeframe
    pub confirmations: Vec<(String, Vec<Candle>)>,
    pub order_book: Option<OrderBook>,
}

/// Indicator values behind a signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorValues {
    pub last_close: Option<f64>,
    pub rsi: Option<f64>,
    pub ema: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub pressure: Option<f64>,
    pub timeframe_rsi: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    pub label: String,
    pub indicators: IndicatorValues,
}

impl Evaluation {
    pub fn neutral(label: &str) -> Self {
        Self {
            signal: Signal::Neutral,
            label: label.to_string(),
            indicators: IndicatorValues::default(),
        }
    }

    pub fn low_liquidity() -> Self {
        Self::neutral(LABEL_LOW_LIQUIDITY)
    }
}

/// Base trait for all signal strategies
pub trait Strategy: Send + Sync {
    /// Reduce market data to a discrete signal. Never fails: thin or
    /// malformed input yields NEUTRAL with an explanatory label.
    fn evaluate(&self, market: &MarketSnapshot) -> Evaluation;

    /// Get strategy name
    fn name(&self) -> &str;

    /// What to fetch before calling `evaluate`
    fn requirements(&self) -> DataRequirements;
}

/// Strategy for a wallet mode. SNIPER has none: it is driven by the trade
/// stream, never by the scan cycle.
pub fn strategy_for(mode: StrategyMode, timeframe: Option<&str>) -> Option<Box<dyn Strategy>> {
    match mode {
        StrategyMode::Swing => Some(Box::new(SwingStrategy::swing(timeframe.unwrap_or("4h")))),
        StrategyMode::Scalp => Some(Box::new(SwingStrategy::scalp())),
        StrategyMode::Triple => Some(Box::new(TripleStrategy::default())),
        StrategyMode::Flow => Some(Box::new(FlowStrategy::default())),
        StrategyMode::Sniper => None,
    }
}

/// Evaluate `market` under `mode`
pub fn evaluate(mode: StrategyMode, market: &MarketSnapshot) -> Evaluation {
    match strategy_for(mode, None) {
        Some(strategy) => strategy.evaluate(market),
        None => Evaluation::neutral("STREAM_DRIVEN"),
    }
}

pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::Candle;
    use chrono::{Duration, Utc};

    pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "TEST".to_string(),
                open_time: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1000.0,
            })
            .collect()
    }
}
