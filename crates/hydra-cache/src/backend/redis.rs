//! Redis backend over a deadpool connection pool.

use super::{ttl_secs, KvBackend};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use hydra_config::RedisConfig;
use hydra_core::{HydraError, HydraResult};
use redis::AsyncCommands;
use shaku::Component;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Create a Redis connection pool and verify it with a `PING`.
pub async fn create_pool(config: &RedisConfig) -> HydraResult<Pool> {
    info!("Creating Redis connection pool...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| HydraError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| HydraError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!(url = %config.url, pool_size = config.pool_size, "Redis connection pool created successfully");

    Ok(pool)
}

/// Redis-backed store.
#[derive(Component)]
#[shaku(interface = KvBackend)]
pub struct RedisBackend {
    /// Redis connection pool. `None` until the module supplies one.
    #[shaku(default)]
    pool: Option<Arc<Pool>>,
}

impl RedisBackend {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Connects using the given configuration.
    pub async fn connect(config: &RedisConfig) -> HydraResult<Self> {
        Ok(Self::new(Arc::new(create_pool(config).await?)))
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> HydraResult<Connection> {
        match &self.pool {
            Some(pool) => Ok(pool.get().await?),
            None => Err(HydraError::store("Redis pool not configured")),
        }
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> HydraResult<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> HydraResult<()> {
        let mut conn = self.get_conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> HydraResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn().await?;
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> HydraResult<bool> {
        let mut conn = self.get_conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> HydraResult<bool> {
        let mut conn = self.get_conn().await?;
        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let applied: bool = conn.expire(key, secs).await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> HydraResult<Option<Duration>> {
        let mut conn = self.get_conn().await?;
        // -2 missing, -1 no expiry
        let secs: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    async fn keys(&self, pattern: &str) -> HydraResult<Vec<String>> {
        let mut conn = self.get_conn().await?;

        // KEYS blocks the server; acceptable for maintenance-sized keyspaces only.
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut *conn)
            .await?;

        debug!(pattern, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> HydraResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_conn().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }
        let values: Vec<Option<String>> = pipe.query_async(&mut *conn).await?;
        Ok(values)
    }

    async fn mset_ex(&self, items: &[(String, String)], ttl: Duration) -> HydraResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let secs = ttl_secs(ttl);
        let mut conn = self.get_conn().await?;
        let mut pipe = redis::pipe();
        for (key, value) in items {
            pipe.set_ex(key, value, secs).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;
        Ok(())
    }

    async fn mexpire(&self, keys: &[String], ttl: Duration) -> HydraResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let secs = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let mut conn = self.get_conn().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.expire(key, secs);
        }
        let applied: Vec<bool> = pipe.query_async(&mut *conn).await?;
        Ok(applied.into_iter().filter(|ok| *ok).count() as u64)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> HydraResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn().await?;
        let added: u64 = conn.sadd(key, members).await?;
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> HydraResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn().await?;
        let removed: u64 = conn.srem(key, members).await?;
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> HydraResult<HashSet<String>> {
        let mut conn = self.get_conn().await?;
        let members: HashSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn ping(&self) -> HydraResult<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }
}
