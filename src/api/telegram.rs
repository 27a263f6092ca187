use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Fire-and-forget Telegram notifications.
///
/// Sending happens on a spawned task; failures are logged and never reach
/// the trading path. Without a token and chat id every call is a no-op.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    target: Option<(String, String)>,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        Self::with_api_base(TELEGRAM_API, token, chat_id)
    }

    pub fn with_api_base(api_base: &str, token: Option<String>, chat_id: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            target: token.zip(chat_id),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Queue a Markdown message. Requires a running tokio runtime.
    pub fn notify(&self, text: impl Into<String>) {
        if self.target.is_none() {
            return;
        }
        let notifier = self.clone();
        let text = text.into();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&text).await {
                tracing::warn!("Telegram notification failed: {}", e);
            }
        });
    }

    /// Send immediately and report the outcome
    pub async fn send(&self, text: &str) -> crate::Result<()> {
        let Some((token, chat_id)) = &self.target else {
            return Ok(());
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::BotError::upstream("telegram", format!("{}: {}", status, body)));
        }
        Ok(())
    }
}
