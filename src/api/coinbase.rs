use crate::{BotError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotData,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    amount: String,
}

/// Coinbase public spot price, used as the last-resort price oracle
#[derive(Clone)]
pub struct CoinbaseClient {
    client: Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Spot price of the symbol's base asset in USD (`BTCUSDT` -> `BTC-USD`)
    pub async fn spot_price(&self, symbol: &str) -> Result<f64> {
        let base = symbol.strip_suffix("USDT").unwrap_or(symbol);
        let url = format!("{}/v2/prices/{}-USD/spot", self.base_url, base);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::upstream(
                "coinbase",
                format!("{} for {}", status, symbol),
            ));
        }

        let spot: SpotResponse = response.json().await?;
        let price: f64 = spot.data.amount.parse()?;
        if price <= 0.0 {
            return Err(BotError::InvalidData(format!("non-positive spot price for {}", symbol)));
        }

        Ok(price)
    }
}
