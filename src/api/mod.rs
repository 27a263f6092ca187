pub mod binance;
pub mod coinbase;
pub mod telegram;
pub mod trader;

pub use binance::{BinanceClient, MarketData, Ticker24h};
pub use coinbase::CoinbaseClient;
pub use telegram::TelegramNotifier;
pub use trader::{AccountBalance, BinanceTrader, OrderResponse, OrderSize};
