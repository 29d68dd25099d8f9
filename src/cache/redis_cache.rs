//! A `Cache` backed by a Redis server.

use crate::cache::Cache;
use crate::error::Res;
use anyhow::Context;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

/// Talks to Redis through a `ConnectionManager`, which reconnects on its own after the server goes
/// away. Cloning the manager is cheap and every call works on its own clone.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Res<Self> {
        let client = Client::open(redis_url).context("Invalid redis_url")?;
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);
        let connection = client
            .get_connection_manager_with_config(config)
            .await
            .context("Unable to connect to Redis")?;
        debug!("Connected to Redis");
        Ok(Self { connection })
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Res<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection
            .get(key)
            .await
            .with_context(|| format!("Redis GET {key} failed"))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Res<()> {
        let mut connection = self.connection.clone();
        // Redis rejects an expiry of zero seconds.
        let seconds = ttl.as_secs().max(1);
        let _: () = connection
            .set_ex(key, value, seconds)
            .await
            .with_context(|| format!("Redis SETEX {key} failed"))?;
        Ok(())
    }

    async fn flush_all(&self) -> Res<()> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("FLUSHALL")
            .query_async(&mut connection)
            .await
            .context("Redis FLUSHALL failed")?;
        Ok(())
    }
}
