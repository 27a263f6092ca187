use super::Tick;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Ticks kept for inspection per symbol
pub const MAX_TICK_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickPoint {
    /// Trade time, epoch millis
    pub time: i64,
    pub price: f64,
    pub delta: f64,
    pub cumulative_delta: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SniperStats {
    pub start_time: DateTime<Utc>,
    pub messages: u64,
    pub triggers: u64,
}

/// Read-only view of one symbol's CVD state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SniperSnapshot {
    pub symbol: String,
    pub price: f64,
    pub cumulative_delta: f64,
    pub tick_history: Vec<TickPoint>,
    pub stats: SniperStats,
}

/// Taker buys count positive, taker sells negative
pub fn signed_delta(price: f64, quantity: f64, is_buyer_maker: bool) -> f64 {
    let notional = price * quantity;
    if is_buyer_maker {
        -notional
    } else {
        notional
    }
}

/// Cumulative volume delta for one symbol with a bounded tick history
#[derive(Debug, Clone)]
pub struct CvdTracker {
    symbol: String,
    cumulative_delta: f64,
    last_price: f64,
    history: VecDeque<TickPoint>,
    max_history: usize,
    stats: SniperStats,
}

impl CvdTracker {
    pub fn new(symbol: &str) -> Self {
        Self::with_capacity(symbol, MAX_TICK_HISTORY)
    }

    pub fn with_capacity(symbol: &str, max_history: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            cumulative_delta: 0.0,
            last_price: 0.0,
            history: VecDeque::with_capacity(max_history),
            max_history,
            stats: SniperStats {
                start_time: Utc::now(),
                messages: 0,
                triggers: 0,
            },
        }
    }

    /// Fold a tick into the running delta and return its signed notional
    pub fn record(&mut self, tick: &Tick) -> f64 {
        let delta = signed_delta(tick.price, tick.quantity, tick.is_buyer_maker);

        self.last_price = tick.price;
        self.stats.messages += 1;
        self.cumulative_delta += delta;

        self.history.push_back(TickPoint {
            time: tick.time.timestamp_millis(),
            price: tick.price,
            delta,
            cumulative_delta: self.cumulative_delta,
        });

        // Remove oldest if exceeds max
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }

        delta
    }

    pub fn record_trigger(&mut self) {
        self.stats.triggers += 1;
    }

    pub fn cumulative_delta(&self) -> f64 {
        self.cumulative_delta
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn snapshot(&self) -> SniperSnapshot {
        SniperSnapshot {
            symbol: self.symbol.clone(),
            price: self.last_price,
            cumulative_delta: self.cumulative_delta,
            tick_history: self.history.iter().copied().collect(),
            stats: self.stats.clone(),
        }
    }
}
