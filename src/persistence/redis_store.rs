use super::KeyValueStore;
use crate::{BotError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed key-value store.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so one
/// store can be shared by the cycle driver and every sniper stream.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| BotError::StoreTimeout("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = timeout(COMMAND_TIMEOUT, conn.get(key))
            .await
            .map_err(|_| BotError::StoreTimeout(format!("GET {}", key)))??;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        timeout(COMMAND_TIMEOUT, conn.set::<_, _, ()>(key, value))
            .await
            .map_err(|_| BotError::StoreTimeout(format!("SET {}", key)))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        // Try to connect to non-existent Redis
        let result = RedisStore::connect("redis://192.0.2.1:6379").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_set_and_get() {
        let store = RedisStore::connect("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        store
            .set("sentinel_test_key", "{\"ok\":true}".to_string())
            .await
            .unwrap();
        let value = store.get("sentinel_test_key").await.unwrap();
        assert_eq!(value.as_deref(), Some("{\"ok\":true}"));

        assert!(store.get("sentinel_missing_key").await.unwrap().is_none());
    }
}
