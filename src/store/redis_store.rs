use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{StateStore, StoreError};

/// Redis-backed state store.
///
/// Uses a [`ConnectionManager`], which reconnects on its own after the
/// initial connection succeeds.
pub struct RedisStore {
    url: String,
    conn: Option<ConnectionManager>,
}

impl RedisStore {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            conn: None,
        }
    }

    fn conn(&self) -> Result<ConnectionManager, StoreError> {
        self.conn.clone().ok_or(StoreError::NotConnected)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn connect(&mut self) -> Result<(), StoreError> {
        info!("Connecting to Redis...");

        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        self.conn = Some(conn);

        info!("Connected to Redis");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), StoreError> {
        if self.conn.take().is_some() {
            info!("Disconnected from Redis");
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        let Ok(mut conn) = self.conn() else {
            return false;
        };
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        debug!(key = %key, "Written key");
        Ok(())
    }

    async fn set_atomic(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        // MULTI ... EXEC
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set(*key, value.as_str()).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(keys = entries.len(), "Committed transaction");
        Ok(())
    }
}
