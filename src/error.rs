use thiserror::Error;

/// Errors produced by the trading core.
///
/// Variants follow the failure classes the bot reacts to differently:
/// transient upstream problems fall through failover chains, configuration
/// problems fail fast, capital problems skip an entry without mutating state,
/// and store problems abort the current cycle.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_name} upstream failure: {message}")]
    Upstream {
        source_name: String,
        message: String,
    },

    #[error("No price source could quote {0}")]
    QuoteUnavailable(String),

    #[error("Missing exchange API credentials for LIVE trading")]
    MissingCredentials,

    #[error("Notional ${notional:.2} is below the exchange minimum (${minimum:.2})")]
    BelowMinNotional { notional: f64, minimum: f64 },

    #[error("Safety limit: {0}")]
    SafetyLimit(String),

    #[error("Insufficient funds: ${required:.2} needed, ${available:.2} available")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Exchange rejected request ({status}): {body}")]
    Exchange { status: u16, body: String },

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Store timeout: {0}")]
    StoreTimeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No open trade with id {0}")]
    TradeNotFound(String),
}

impl BotError {
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Timeouts, 5xx, region blocks (451/403) and rate limits.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BotError::Upstream { .. } | BotError::QuoteUnavailable(_) => true,
            BotError::Exchange { status, .. } => {
                *status >= 500 || *status == 429 || *status == 451 || *status == 403
            }
            BotError::WebSocket(_) | BotError::StoreTimeout(_) => true,
            _ => false,
        }
    }

    /// Capital errors mean "skip the entry", never "abort the cycle".
    pub fn is_capital(&self) -> bool {
        matches!(
            self,
            BotError::BelowMinNotional { .. }
                | BotError::SafetyLimit(_)
                | BotError::InsufficientFunds { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BotError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BotError::WebSocket(Box::new(e))
    }
}

impl From<std::num::ParseFloatError> for BotError {
    fn from(e: std::num::ParseFloatError) -> Self {
        BotError::InvalidData(e.to_string())
    }
}
