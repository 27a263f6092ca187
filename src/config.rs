use crate::models::TradingMode;
use crate::Result;
use serde::Deserialize;
use std::time::Duration;

pub const BINANCE_GLOBAL: &str = "https://api.binance.com";
pub const BINANCE_US: &str = "https://api.binance.us";
pub const COINBASE_API: &str = "https://api.coinbase.com";
pub const BINANCE_STREAM: &str = "wss://stream.binance.com:9443/ws";

/// Deployment region, decides which exchange is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

/// Process-wide settings, built once at start-up and passed explicitly
/// into every component that talks to the outside world.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub region: Region,
    pub redis_url: String,
    #[serde(default)]
    pub binance_api_key: Option<String>,
    #[serde(default)]
    pub binance_api_secret: Option<String>,
    #[serde(default)]
    pub binance_base_url: Option<String>,
    #[serde(default)]
    pub telegram_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    /// Fallback when the wallet config has never been persisted
    #[serde(default)]
    pub trading_mode: TradingMode,
    pub cycle_interval_secs: u64,
    pub quote_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub universe_size: usize,
    pub min_quote_volume: f64,
    pub sniper_symbols: String,
    pub rate_limit_per_minute: u32,
}

impl Settings {
    /// Load settings: defaults, then `sentinel.toml` if present, then environment.
    ///
    /// Environment keys are the upper-case field names (`REGION`, `REDIS_URL`,
    /// `BINANCE_API_KEY`, ...).
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("region", "US")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("trading_mode", "SIMULATION")?
            .set_default("cycle_interval_secs", 60)?
            .set_default("quote_timeout_ms", 4000)?
            .set_default("http_timeout_ms", 8000)?
            .set_default("universe_size", 20)?
            .set_default("min_quote_volume", 10_000_000.0)?
            .set_default("sniper_symbols", "BTCUSDT")?
            .set_default("rate_limit_per_minute", 600)?
            .add_source(config::File::with_name("sentinel").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// REST base URLs in failover order.
    ///
    /// EU deployments talk to the global exchange directly; everywhere else the
    /// regional exchange comes first and the global one is the fallback.
    pub fn exchange_bases(&self) -> Vec<String> {
        match self.region {
            Region::Eu => vec![BINANCE_GLOBAL.to_string(), BINANCE_US.to_string()],
            Region::Us => vec![BINANCE_US.to_string(), BINANCE_GLOBAL.to_string()],
        }
    }

    /// Base URL used for signed order submission.
    pub fn trading_base(&self) -> String {
        if let Some(url) = &self.binance_base_url {
            return url.clone();
        }
        match self.region {
            Region::Eu => BINANCE_GLOBAL.to_string(),
            Region::Us => BINANCE_US.to_string(),
        }
    }

    pub fn sniper_symbols(&self) -> Vec<String> {
        self.sniper_symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: Region::Us,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            binance_api_key: None,
            binance_api_secret: None,
            binance_base_url: None,
            telegram_token: None,
            telegram_chat_id: None,
            trading_mode: TradingMode::Simulation,
            cycle_interval_secs: 60,
            quote_timeout_ms: 4000,
            http_timeout_ms: 8000,
            universe_size: 20,
            min_quote_volume: 10_000_000.0,
            sniper_symbols: "BTCUSDT".to_string(),
            rate_limit_per_minute: 600,
        }
    }
}
