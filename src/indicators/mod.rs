// Technical indicators module
// RSI (Wilder), SMA/EMA, Bollinger Bands and order-book imbalance

pub mod bollinger;
pub mod moving_average;
pub mod order_flow;
pub mod rsi;

pub use bollinger::{calculate_bollinger, BollingerBands};
pub use moving_average::{calculate_ema, calculate_sma, population_std_dev};
pub use order_flow::{book_imbalance, BookImbalance};
pub use rsi::calculate_rsi;
