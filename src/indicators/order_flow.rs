use crate::models::OrderBook;

/// Summed resting volume on each side of the book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookImbalance {
    pub bid_volume: f64,
    pub ask_volume: f64,
}

impl BookImbalance {
    /// bid/ask volume ratio, `None` when either side is empty
    pub fn pressure(&self) -> Option<f64> {
        if self.bid_volume <= 0.0 || self.ask_volume <= 0.0 {
            return None;
        }
        Some(self.bid_volume / self.ask_volume)
    }
}

/// Sum base quantity across the top `depth` levels of each side
pub fn book_imbalance(book: &OrderBook, depth: usize) -> BookImbalance {
    let side_volume =
        |levels: &[(f64, f64)]| levels.iter().take(depth).map(|(_, qty)| qty).sum::<f64>();

    BookImbalance {
        bid_volume: side_volume(&book.bids),
        ask_volume: side_volume(&book.asks),
    }
}
