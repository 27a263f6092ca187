use super::{DataRequirements, Evaluation, IndicatorValues, MarketSnapshot, Strategy};
use crate::indicators::book_imbalance;
use crate::models::Signal;

/// Order-book imbalance strategy. Ignores price history entirely.
#[derive(Debug, Clone)]
pub struct FlowStrategy {
    pub depth: usize,
    pub strong_buy: f64,
    pub buy: f64,
    pub sell: f64,
    pub strong_sell: f64,
}

impl Default for FlowStrategy {
    fn default() -> Self {
        Self {
            depth: 20,
            strong_buy: 2.0,
            buy: 1.5,
            sell: 0.75,
            strong_sell: 0.5,
        }
    }
}

impl FlowStrategy {
    pub fn classify(&self, pressure: f64) -> (Signal, &'static str) {
        if pressure >= self.strong_buy {
            (Signal::StrongBuy, "BID WALL")
        } else if pressure >= self.buy {
            (Signal::Buy, "BID PRESSURE")
        } else if pressure <= self.strong_sell {
            (Signal::StrongSell, "ASK WALL")
        } else if pressure <= self.sell {
            (Signal::Sell, "ASK PRESSURE")
        } else {
            (Signal::Neutral, "BALANCED")
        }
    }
}

impl Strategy for FlowStrategy {
    fn evaluate(&self, market: &MarketSnapshot) -> Evaluation {
        let Some(book) = &market.order_book else {
            return Evaluation::neutral("NO_BOOK");
        };

        let imbalance = book_imbalance(book, self.depth);
        let Some(pressure) = imbalance.pressure() else {
            return Evaluation::low_liquidity();
        };

        let (signal, label) = self.classify(pressure);

        tracing::debug!(
            bid_volume = imbalance.bid_volume,
            ask_volume = imbalance.ask_volume,
            pressure,
            "Order flow check"
        );

        Evaluation {
            signal,
            label: label.to_string(),
            indicators: IndicatorValues {
                pressure: Some(pressure),
                ..Default::default()
            },
        }
    }

    fn name(&self) -> &str {
        "Flow"
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            interval: None,
            confirmations: Vec::new(),
            candle_limit: 0,
            order_book: true,
        }
    }
}
