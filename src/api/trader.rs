use crate::models::OrderSide;
use crate::{BotError, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Size of a market order: quote notional for buys, base quantity for sells
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    Quote(f64),
    Base(f64),
}

/// Relevant part of the exchange's order acknowledgement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    #[serde(default)]
    pub status: String,
    pub executed_qty: String,
    pub cummulative_quote_qty: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccountBalance {
    pub free: f64,
    pub locked: f64,
}

impl AccountBalance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

/// Signed Binance spot endpoints (orders and account)
#[derive(Clone)]
pub struct BinanceTrader {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceTrader {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    /// Build from settings; `None` when credentials are missing
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Option<Self>> {
        match (&settings.binance_api_key, &settings.binance_api_secret) {
            (Some(key), Some(secret)) => Ok(Some(Self::new(
                &settings.trading_base(),
                key,
                secret,
                settings.http_timeout(),
            )?)),
            _ => Ok(None),
        }
    }

    /// HMAC-SHA256 of the query string, hex encoded
    pub fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| BotError::InvalidData(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        let query = query.join("&");
        let signature = self.sign(&query)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, endpoint, query, signature
        ))
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("🚨 Binance API error [{}]: {} {}", endpoint, status, body);
            return Err(BotError::Exchange {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Submit a MARKET order
    pub async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: OrderSize,
    ) -> Result<OrderResponse> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
        ];
        match size {
            OrderSize::Quote(notional) => params.push(("quoteOrderQty", format!("{:.2}", notional))),
            OrderSize::Base(quantity) => params.push(("quantity", quantity.to_string())),
        }

        let url = self.signed_url("/api/v3/order", &params)?;
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::read_response(response, "/api/v3/order").await
    }

    /// Free and locked balance of one asset
    pub async fn account_balance(&self, asset: &str) -> Result<AccountBalance> {
        let url = self.signed_url("/api/v3/account", &[])?;
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let account: AccountResponse = Self::read_response(response, "/api/v3/account").await?;
        let Some(balance) = account.balances.iter().find(|b| b.asset == asset) else {
            return Ok(AccountBalance::default());
        };

        Ok(AccountBalance {
            free: balance.free.parse()?,
            locked: balance.locked.parse()?,
        })
    }
}
