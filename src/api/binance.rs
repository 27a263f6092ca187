use crate::models::{Candle, MarketQuote, OrderBook};
use crate::{BotError, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Market data the cycle needs for scanning
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Candles oldest first
    async fn klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    async fn order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook>;

    /// 24h statistics for every listed symbol
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: f64,
    pub quote_volume: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker24h {
    symbol: String,
    #[serde(default)]
    last_price: Option<String>,
    #[serde(default)]
    quote_volume: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBookTicker {
    bid_price: String,
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

/// Public Binance REST client.
///
/// Holds an ordered list of base URLs (regional exchange and global one) and
/// falls through to the next base on any failure. Cloneable; all clones
/// share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    bases: Vec<String>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceClient {
    pub fn new(bases: Vec<String>, timeout: Duration, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            bases,
            rate_limiter,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", base, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// GET `path` from each base in order until one answers
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut last_error = BotError::upstream("binance", "no base URL configured");

        for base in &self.bases {
            match self.fetch(base, path).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(base = %base, path = %path, "Binance request failed: {}", e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Best bid/ask from one base
    pub async fn book_ticker_at(&self, base: &str, symbol: &str) -> Result<MarketQuote> {
        let raw: RawBookTicker = self
            .fetch(base, &format!("/api/v3/ticker/bookTicker?symbol={}", symbol))
            .await?;

        let bid: f64 = raw.bid_price.parse()?;
        let ask: f64 = raw.ask_price.parse()?;
        if bid <= 0.0 || ask <= 0.0 {
            return Err(BotError::InvalidData(format!("empty book for {}", symbol)));
        }

        Ok(MarketQuote {
            price: (bid + ask) / 2.0,
            bid,
            ask,
        })
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<Value>> = self
            .get_json(&format!(
                "/api/v3/klines?symbol={}&interval={}&limit={}",
                symbol, interval, limit
            ))
            .await?;

        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }

    async fn order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook> {
        let raw: RawDepth = self
            .get_json(&format!("/api/v3/depth?symbol={}&limit={}", symbol, limit))
            .await?;

        Ok(OrderBook {
            bids: parse_levels(&raw.bids)?,
            asks: parse_levels(&raw.asks)?,
        })
    }

    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>> {
        let raw: Vec<RawTicker24h> = self.get_json("/api/v3/ticker/24hr").await?;

        Ok(raw
            .into_iter()
            .map(|t| Ticker24h {
                symbol: t.symbol,
                last_price: parse_opt(t.last_price.as_deref()),
                quote_volume: parse_opt(t.quote_volume.as_deref()),
            })
            .collect())
    }
}

fn parse_opt(value: Option<&str>) -> f64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0.0)
}

fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<(f64, f64)>> {
    levels
        .iter()
        .map(|[price, qty]| -> Result<(f64, f64)> { Ok((price.parse()?, qty.parse()?)) })
        .collect()
}

/// `[openTime, "open", "high", "low", "close", "volume", ...]`
fn parse_kline(symbol: &str, row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(BotError::InvalidData(format!(
            "kline row for {} has {} fields",
            symbol,
            row.len()
        )));
    }

    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| BotError::InvalidData("kline open time is not an integer".into()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| BotError::InvalidData(format!("bad kline time {}", open_ms)))?;

    let field = |i: usize| -> Result<f64> {
        match &row[i] {
            Value::String(s) => Ok(s.parse()?),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| BotError::InvalidData("kline number out of range".into())),
            other => Err(BotError::InvalidData(format!("unexpected kline field {}", other))),
        }
    };

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(bases: Vec<String>) -> BinanceClient {
        BinanceClient::new(bases, Duration::from_secs(2), 600).unwrap()
    }

    #[tokio::test]
    async fn test_klines_parsing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines?symbol=BTCUSDT&interval=4h&limit=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[[1700000000000,"100.0","110.0","95.0","105.5","12.3",1700014399999,"0",1,"0","0","0"],
                    [1700014400000,"105.5","106.0","101.0","102.0","8.1",1700028799999,"0",1,"0","0","0"]]"#,
            )
            .create_async()
            .await;

        let candles = client(vec![server.url()])
            .klines("BTCUSDT", "4h", 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 105.5);
        assert_eq!(candles[1].low, 101.0);
        assert_eq!(candles[0].open_time.timestamp_millis(), 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_order_book_parsing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/depth?symbol=ETHUSDT&limit=20")
            .with_status(200)
            .with_body(r#"{"lastUpdateId":1,"bids":[["2000.5","1.5"],["2000.0","3"]],"asks":[["2001.0","0.5"]]}"#)
            .create_async()
            .await;

        let book = client(vec![server.url()])
            .order_book("ETHUSDT", 20)
            .await
            .unwrap();

        assert_eq!(book.bids, vec![(2000.5, 1.5), (2000.0, 3.0)]);
        assert_eq!(book.asks, vec![(2001.0, 0.5)]);
    }

    #[tokio::test]
    async fn test_fails_over_to_next_base() {
        let mut blocked = mockito::Server::new_async().await;
        let _blocked = blocked
            .mock("GET", "/api/v3/ticker/24hr")
            .with_status(451)
            .with_body("Service unavailable from a restricted location")
            .create_async()
            .await;

        let mut healthy = mockito::Server::new_async().await;
        let _healthy = healthy
            .mock("GET", "/api/v3/ticker/24hr")
            .with_status(200)
            .with_body(r#"[{"symbol":"BTCUSDT","lastPrice":"50000.0","quoteVolume":"123456789.5"}]"#)
            .create_async()
            .await;

        let tickers = client(vec![blocked.url(), healthy.url()])
            .tickers_24h()
            .await
            .unwrap();

        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].quote_volume, 123456789.5);
    }

    #[tokio::test]
    async fn test_all_bases_failing_returns_last_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .with_status(503)
            .create_async()
            .await;

        let err = client(vec![server.url()]).tickers_24h().await.unwrap_err();
        assert!(matches!(err, BotError::Exchange { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_book_ticker_quote() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/ticker/bookTicker?symbol=SOLUSDT")
            .with_status(200)
            .with_body(r#"{"symbol":"SOLUSDT","bidPrice":"99.00","bidQty":"10","askPrice":"101.00","askQty":"5"}"#)
            .create_async()
            .await;

        let url = server.url();
        let quote = client(vec![url.clone()])
            .book_ticker_at(&url, "SOLUSDT")
            .await
            .unwrap();
        assert_eq!(quote.bid, 99.0);
        assert_eq!(quote.ask, 101.0);
        assert_eq!(quote.price, 100.0);
    }

    #[test]
    fn test_short_kline_row_rejected() {
        let row = vec![Value::from(1), Value::from("1.0")];
        assert!(parse_kline("BTCUSDT", &row).is_err());
    }
}
