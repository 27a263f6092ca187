use crate::api::{BinanceClient, CoinbaseClient};
use crate::config::{Region, Settings, BINANCE_GLOBAL, BINANCE_US, COINBASE_API};
use crate::models::MarketQuote;
use crate::{BotError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;

/// One place a quote can come from
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;
    async fn quote(&self, symbol: &str) -> Result<MarketQuote>;
}

/// Anything that can resolve a quote for a symbol
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn resolve_quote(&self, symbol: &str) -> Result<MarketQuote>;
}

/// Best bid/ask from one Binance deployment
pub struct BinanceBookSource {
    name: String,
    base: String,
    client: BinanceClient,
}

impl BinanceBookSource {
    pub fn new(name: &str, base: &str, client: BinanceClient) -> Self {
        Self {
            name: name.to_string(),
            base: base.to_string(),
            client,
        }
    }
}

#[async_trait]
impl QuoteSource for BinanceBookSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, symbol: &str) -> Result<MarketQuote> {
        self.client.book_ticker_at(&self.base, symbol).await
    }
}

/// Coinbase spot price. No book, so bid = ask = price.
pub struct CoinbaseSpotSource {
    client: CoinbaseClient,
}

impl CoinbaseSpotSource {
    pub fn new(client: CoinbaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuoteSource for CoinbaseSpotSource {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn quote(&self, symbol: &str) -> Result<MarketQuote> {
        let price = self.client.spot_price(symbol).await?;
        Ok(MarketQuote::from_last(price))
    }
}

/// Resolves quotes through a fixed failover chain.
///
/// Each source is tried once, under its own timeout. The first answer wins;
/// if every source fails the symbol is unquotable for now and callers must
/// skip it rather than fall back to an old price.
pub struct PriceOracle {
    sources: Vec<Box<dyn QuoteSource>>,
    timeout: Duration,
}

impl PriceOracle {
    pub fn new(sources: Vec<Box<dyn QuoteSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Region-ordered chain: EU asks the global exchange first, elsewhere
    /// the regional exchange leads and the global one follows. Coinbase is
    /// always last.
    pub fn from_settings(settings: &Settings, binance: &BinanceClient) -> Result<Self> {
        let global = BinanceBookSource::new("binance", BINANCE_GLOBAL, binance.clone());
        let us = BinanceBookSource::new("binance.us", BINANCE_US, binance.clone());
        let coinbase = CoinbaseSpotSource::new(CoinbaseClient::new(
            COINBASE_API,
            settings.quote_timeout(),
        )?);

        let sources: Vec<Box<dyn QuoteSource>> = match settings.region {
            Region::Eu => vec![Box::new(global), Box::new(coinbase)],
            Region::Us => vec![Box::new(us), Box::new(global), Box::new(coinbase)],
        };

        Ok(Self::new(sources, settings.quote_timeout()))
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl QuoteProvider for PriceOracle {
    async fn resolve_quote(&self, symbol: &str) -> Result<MarketQuote> {
        for source in &self.sources {
            match timeout(self.timeout, source.quote(symbol)).await {
                Ok(Ok(quote)) => {
                    tracing::debug!(
                        symbol = %symbol,
                        source = source.name(),
                        price = quote.price,
                        "Resolved quote"
                    );
                    return Ok(quote);
                }
                Ok(Err(e)) if e.is_transient() => {
                    tracing::warn!(symbol = %symbol, "{} quote failed: {}", source.name(), e);
                }
                Ok(Err(e)) => {
                    tracing::error!(symbol = %symbol, "❌ {} quote rejected: {}", source.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        symbol = %symbol,
                        "{} quote timed out after {:?}",
                        source.name(),
                        self.timeout
                    );
                }
            }
        }

        Err(BotError::QuoteUnavailable(symbol.to_string()))
    }
}
