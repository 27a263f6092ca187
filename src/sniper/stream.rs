use super::engine::CvdSniper;
use super::Tick;
use crate::{BotError, Result};
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Deadline for the TCP, TLS and WebSocket handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated on an open socket. Binance pings every three
/// minutes, so a healthy connection never reaches it.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimeouts {
    pub connect: Duration,
    pub idle: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            idle: IDLE_TIMEOUT,
        }
    }
}

/// Binance aggregated trade event
#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl AggTrade {
    pub fn into_tick(self) -> Result<Tick> {
        Ok(Tick {
            price: self.price.parse()?,
            quantity: self.quantity.parse()?,
            time: Utc
                .timestamp_millis_opt(self.trade_time)
                .single()
                .unwrap_or_else(Utc::now),
            symbol: self.symbol.to_uppercase(),
            is_buyer_maker: self.is_buyer_maker,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Listening,
    Reconnecting,
}

pub fn stream_url(base: &str, symbol: &str) -> String {
    format!(
        "{}/{}@aggTrade",
        base.trim_end_matches('/'),
        symbol.to_lowercase()
    )
}

/// Feed one symbol's aggregated trades into the sniper, forever.
///
/// Any disconnect, socket error, stalled handshake or silent socket drops
/// back to `Reconnecting` and retries after [`RECONNECT_DELAY`]. Errors
/// handling a single tick are logged and never end the stream.
pub async fn run_stream(sniper: Arc<CvdSniper>, symbol: String, base: String) {
    let url = stream_url(&base, &symbol);
    let timeouts = StreamTimeouts::default();
    let mut state = StreamState::Connecting;

    loop {
        if state == StreamState::Reconnecting {
            tokio::time::sleep(RECONNECT_DELAY).await;
        }

        tracing::info!("🔌 Connecting to {} ({:?})", url, state);
        match listen(&sniper, &url, &mut state, timeouts).await {
            Ok(()) => tracing::warn!("🔌 Stream {} closed by server", symbol),
            Err(e) => tracing::error!("❌ Stream {} failed: {}", symbol, e),
        }

        state = StreamState::Reconnecting;
        tracing::info!("🔄 Reconnecting {} in {:?}", symbol, RECONNECT_DELAY);
    }
}

async fn listen(
    sniper: &CvdSniper,
    url: &str,
    state: &mut StreamState,
    timeouts: StreamTimeouts,
) -> Result<()> {
    let (ws_stream, _) = tokio::time::timeout(timeouts.connect, connect_async(url))
        .await
        .map_err(|_| {
            BotError::upstream(
                "binance-stream",
                format!("handshake timed out after {:?}", timeouts.connect),
            )
        })??;
    let (mut write, mut read) = ws_stream.split();

    *state = StreamState::Listening;
    tracing::info!("✅ Listening on {}", url);

    loop {
        let Some(msg) = tokio::time::timeout(timeouts.idle, read.next())
            .await
            .map_err(|_| {
                BotError::upstream(
                    "binance-stream",
                    format!("no frames for {:?}", timeouts.idle),
                )
            })?
        else {
            break;
        };

        match msg? {
            Message::Text(text) => {
                let tick = match serde_json::from_str::<AggTrade>(&text) {
                    Ok(trade) => trade.into_tick(),
                    Err(e) => {
                        tracing::debug!("Skipping non-trade message: {}", e);
                        continue;
                    }
                };

                match tick {
                    Ok(tick) => {
                        if let Err(e) = sniper.handle_tick(tick).await {
                            tracing::warn!("⚠️  Tick handling failed: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("⚠️  Bad aggTrade payload: {}", e),
                }
            }
            Message::Ping(payload) => {
                write.send(Message::Pong(payload)).await?;
            }
            Message::Close(frame) => {
                tracing::debug!("Close frame: {:?}", frame);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
