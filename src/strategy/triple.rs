use super::{closes, DataRequirements, Evaluation, IndicatorValues, MarketSnapshot, Strategy, MIN_CANDLES};
use crate::indicators::calculate_rsi;
use crate::models::Signal;

/// Multi-timeframe RSI confluence: every timeframe must be oversold at once.
#[derive(Debug, Clone)]
pub struct TripleStrategy {
    primary: String,
    confirmations: Vec<String>,
    rsi_period: usize,
    oversold: f64,
}

impl Default for TripleStrategy {
    fn default() -> Self {
        Self {
            primary: "4h".to_string(),
            confirmations: vec!["1h".to_string(), "15m".to_string()],
            rsi_period: 14,
            oversold: 30.0,
        }
    }
}

impl Strategy for TripleStrategy {
    fn evaluate(&self, market: &MarketSnapshot) -> Evaluation {
        let mut frames = vec![(self.primary.as_str(), market.candles.as_slice())];
        for interval in &self.confirmations {
            let candles = market
                .confirmations
                .iter()
                .find(|(i, _)| i == interval)
                .map(|(_, c)| c.as_slice())
                .unwrap_or(&[]);
            frames.push((interval.as_str(), candles));
        }

        if frames.iter().any(|(_, candles)| candles.len() < MIN_CANDLES) {
            return Evaluation::low_liquidity();
        }

        let timeframe_rsi: Vec<(String, f64)> = frames
            .iter()
            .map(|(interval, candles)| {
                let rsi = calculate_rsi(&closes(candles), self.rsi_period).unwrap_or(50.0);
                (interval.to_string(), rsi)
            })
            .collect();

        let all_oversold = timeframe_rsi.iter().all(|(_, rsi)| *rsi < self.oversold);

        tracing::debug!(
            "Triple check: {}",
            timeframe_rsi
                .iter()
                .map(|(i, r)| format!("{}={:.1}", i, r))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let (signal, label) = if all_oversold {
            (Signal::StrongBuy, "TRIPLE CONFLUENCE")
        } else {
            (Signal::Neutral, "NO CONFLUENCE")
        };

        Evaluation {
            signal,
            label: label.to_string(),
            indicators: IndicatorValues {
                last_close: market.candles.last().map(|c| c.close),
                rsi: timeframe_rsi.first().map(|(_, r)| *r),
                timeframe_rsi,
                ..Default::default()
            },
        }
    }

    fn name(&self) -> &str {
        "Triple"
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            interval: Some(self.primary.clone()),
            confirmations: self.confirmations.clone(),
            candle_limit: 100,
            order_book: false,
        }
    }
}
