use super::{closes, DataRequirements, Evaluation, IndicatorValues, MarketSnapshot, Strategy, MIN_CANDLES};
use crate::indicators::{calculate_bollinger, calculate_ema, calculate_rsi, BollingerBands};
use crate::models::Signal;

/// Configuration for RSI reversal signals
#[derive(Debug, Clone)]
pub struct RsiConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub ema_period: usize,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bb_period: 20,
            bb_std_dev: 2.0,
            ema_period: 200,
        }
    }
}

/// RSI reversal strategy used by SWING and SCALP.
///
/// SWING adds the Bollinger/EMA200 confluence check that escalates an
/// oversold reading to STRONG_BUY; SCALP runs the bare RSI rule on 5m candles.
#[derive(Debug, Clone)]
pub struct SwingStrategy {
    config: RsiConfig,
    interval: String,
    confluence: bool,
    name: &'static str,
}

impl SwingStrategy {
    pub fn swing(interval: &str) -> Self {
        Self {
            config: RsiConfig::default(),
            interval: interval.to_string(),
            confluence: true,
            name: "Swing",
        }
    }

    pub fn scalp() -> Self {
        Self {
            config: RsiConfig::default(),
            interval: "5m".to_string(),
            confluence: false,
            name: "Scalp",
        }
    }
}

impl Strategy for SwingStrategy {
    fn evaluate(&self, market: &MarketSnapshot) -> Evaluation {
        if market.candles.len() < MIN_CANDLES {
            return Evaluation::low_liquidity();
        }

        let prices = closes(&market.candles);
        let last_close = prices[prices.len() - 1];

        // Too few changes for the period: treat as mid-range
        let rsi = calculate_rsi(&prices, self.config.rsi_period).unwrap_or(50.0);
        let (bands, ema) = if self.confluence {
            (
                calculate_bollinger(&prices, self.config.bb_period, self.config.bb_std_dev),
                calculate_ema(&prices, self.config.ema_period),
            )
        } else {
            (None, None)
        };

        let (signal, label) = classify_reversal(&self.config, rsi, last_close, bands, ema);

        tracing::debug!(
            strategy = self.name,
            rsi,
            close = last_close,
            signal = ?signal,
            "RSI reversal check"
        );

        Evaluation {
            signal,
            label: label.to_string(),
            indicators: IndicatorValues {
                last_close: Some(last_close),
                rsi: Some(rsi),
                ema,
                bollinger: bands,
                ..Default::default()
            },
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            interval: Some(self.interval.clone()),
            confirmations: Vec::new(),
            // EMA200 needs a long history
            candle_limit: if self.confluence { 250 } else { 100 },
            order_book: false,
        }
    }
}

/// Map indicator readings to a signal.
///
/// Oversold (RSI below threshold) is a BUY; when the close also sits at or
/// below the lower band while holding above the EMA it becomes STRONG_BUY.
/// The overbought side mirrors this with the upper band and is advisory only.
pub fn classify_reversal(
    config: &RsiConfig,
    rsi: f64,
    last_close: f64,
    bands: Option<BollingerBands>,
    ema: Option<f64>,
) -> (Signal, &'static str) {
    if rsi < config.rsi_oversold {
        let at_lower_band = bands.map(|b| last_close <= b.lower).unwrap_or(false);
        let above_trend = ema.map(|e| last_close > e).unwrap_or(false);
        if at_lower_band && above_trend {
            return (Signal::StrongBuy, "SNIPER BUY");
        }
        return (Signal::Buy, "OVERSOLD");
    }

    if rsi > config.rsi_overbought {
        if bands.map(|b| last_close >= b.upper).unwrap_or(false) {
            return (Signal::StrongSell, "SNIPER SELL");
        }
        return (Signal::Sell, "OVERBOUGHT");
    }

    match ema {
        Some(e) if rsi > 50.0 && last_close > e => (Signal::Neutral, "TREND UP"),
        Some(e) if rsi < 50.0 && last_close < e => (Signal::Neutral, "TREND DOWN"),
        _ => (Signal::Neutral, "NO TRADE"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::candles_from_closes;

    fn bands(lower: f64, upper: f64) -> Option<BollingerBands> {
        Some(BollingerBands {
            upper,
            middle: (upper + lower) / 2.0,
            lower,
        })
    }

    #[test]
    fn test_oversold_at_lower_band_above_ema_is_strong_buy() {
        let config = RsiConfig::default();
        let (signal, label) = classify_reversal(&config, 25.0, 100.0, bands(101.0, 110.0), Some(95.0));
        assert_eq!(signal, Signal::StrongBuy);
        assert_eq!(label, "SNIPER BUY");
    }

    #[test]
    fn test_oversold_below_ema_stays_buy() {
        let config = RsiConfig::default();
        let (signal, _) = classify_reversal(&config, 25.0, 100.0, bands(101.0, 110.0), Some(105.0));
        assert_eq!(signal, Signal::Buy);
    }

    #[test]
    fn test_oversold_without_band_touch_is_buy() {
        let config = RsiConfig::default();
        let (signal, _) = classify_reversal(&config, 25.0, 100.0, bands(98.0, 110.0), Some(95.0));
        assert_eq!(signal, Signal::Buy);
    }

    #[test]
    fn test_overbought_side() {
        let config = RsiConfig::default();
        let (signal, _) = classify_reversal(&config, 75.0, 111.0, bands(98.0, 110.0), None);
        assert_eq!(signal, Signal::StrongSell);
        let (signal, _) = classify_reversal(&config, 75.0, 105.0, bands(98.0, 110.0), None);
        assert_eq!(signal, Signal::Sell);
    }

    #[test]
    fn test_neutral_zone() {
        let config = RsiConfig::default();
        let (signal, label) = classify_reversal(&config, 55.0, 105.0, None, Some(100.0));
        assert_eq!(signal, Signal::Neutral);
        assert_eq!(label, "TREND UP");
    }

    #[test]
    fn test_fewer_than_twenty_candles_is_low_liquidity() {
        let strategy = SwingStrategy::swing("4h");
        let market = MarketSnapshot {
            candles: candles_from_closes(&[100.0; 19]),
            ..Default::default()
        };
        let eval = strategy.evaluate(&market);
        assert_eq!(eval.signal, Signal::Neutral);
        assert_eq!(eval.label, "LOW_LIQUIDITY");
    }

    #[test]
    fn test_scalp_buys_steady_decline() {
        let prices: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let market = MarketSnapshot {
            candles: candles_from_closes(&prices),
            ..Default::default()
        };
        let eval = SwingStrategy::scalp().evaluate(&market);
        assert_eq!(eval.signal, Signal::Buy);
        assert!(eval.indicators.rsi.unwrap() < 30.0);
        assert!(eval.indicators.bollinger.is_none());
    }

    #[test]
    fn test_swing_without_ema_history_does_not_escalate() {
        // Sharp drop on a short history: oversold, but EMA200 unavailable
        let mut prices = vec![100.0; 40];
        prices.extend((1..=10).map(|i| 100.0 - 3.0 * i as f64));
        let market = MarketSnapshot {
            candles: candles_from_closes(&prices),
            ..Default::default()
        };
        let eval = SwingStrategy::swing("4h").evaluate(&market);
        assert_eq!(eval.signal, Signal::Buy);
        assert!(eval.indicators.ema.is_none());
    }
}
