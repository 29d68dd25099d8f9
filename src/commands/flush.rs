use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{cache, Config, Result};
use anyhow::Context;
use tracing::warn;

/// Removes every cached analytics result from the configured cache.
pub async fn flush_cache(config: Config) -> Result<Out<()>> {
    if config.redis_url().is_none() {
        warn!("No redis_url is configured, a running server keeps its own in-process cache");
    }
    let cache = cache::connect(&config).await?;
    cache
        .flush_all()
        .await
        .context("Unable to flush the cache")
        .pub_result(ErrorType::Cache)?;
    Ok("Cache cleared successfully".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_flush_memory_cache() {
        let env = TestEnv::new().await;
        let out = flush_cache(env.config()).await.unwrap();
        assert_eq!(out.message(), "Cache cleared successfully");
    }
}
