// Price resolution, order execution, the scan cycle and manual bookkeeping
pub mod gateway;
pub mod lifecycle;
pub mod manual;
pub mod price_oracle;

#[cfg(test)]
pub(crate) use gateway::test_support;
pub use gateway::{
    format_price, format_quantity, ExecutionReport, OrderExecutor, OrderGateway, OrderRequest,
    MAX_BUY_NOTIONAL, MIN_NOTIONAL_USD,
};
pub use lifecycle::{CycleReport, TradeLifecycle};
pub use manual::{ManualTrades, MANUAL_FLAG};
pub use price_oracle::{
    BinanceBookSource, CoinbaseSpotSource, PriceOracle, QuoteProvider, QuoteSource,
};
