// Whale sniper: CVD from the aggregated trade stream drives single-position entries
pub mod cvd;
pub mod engine;
pub mod stream;

use chrono::{DateTime, Utc};

pub use cvd::{signed_delta, CvdTracker, SniperSnapshot, SniperStats, TickPoint, MAX_TICK_HISTORY};
pub use engine::{
    CvdSniper, EntrySkip, TickOutcome, COOLDOWN_SECS, STOP_LOSS_RATIO, TAKE_PROFIT_RATIO,
};
pub use stream::{run_stream, stream_url, AggTrade, StreamState};

/// One aggregated trade print
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// True when the buyer was the resting side, i.e. a taker sell
    pub is_buyer_maker: bool,
    pub time: DateTime<Utc>,
}
