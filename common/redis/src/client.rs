use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::{Duration, Instant};
use tracing::info;

use crate::{Client, CustomRedisError};

/// Connection settings for a [`RedisClient`].
///
/// Timing logs are opt-in per client, so two clients in the same process can
/// disagree about whether they log command latency.
#[derive(Debug, Clone)]
pub struct RedisClientConfig {
    pub url: String,
    /// `None` means no timeout (blocks indefinitely).
    pub response_timeout: Option<Duration>,
    /// `None` means no timeout (blocks indefinitely).
    pub connection_timeout: Option<Duration>,
    /// Log the latency of every command at INFO level.
    pub log_timings: bool,
}

impl RedisClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            response_timeout: None,
            connection_timeout: None,
            log_timings: false,
        }
    }

    pub fn with_timeouts(
        mut self,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Self {
        self.response_timeout = response_timeout;
        self.connection_timeout = connection_timeout;
        self
    }

    pub fn with_log_timings(mut self, log_timings: bool) -> Self {
        self.log_timings = log_timings;
        self
    }

    pub async fn build(self) -> Result<RedisClient, CustomRedisError> {
        RedisClient::with_config(self).await
    }
}

pub struct RedisClient {
    connection: MultiplexedConnection,
    log_timings: bool,
}

impl RedisClient {
    /// Create a new RedisClient with no timeouts and timing logs disabled.
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        Self::with_config(RedisClientConfig::new(addr)).await
    }

    /// Create a new RedisClient with full configuration control
    ///
    /// # Errors
    /// Returns `CustomRedisError::InvalidConfiguration` if `Some(Duration::ZERO)` is passed
    /// as a timeout - use `None` for no timeout instead.
    ///
    /// # Examples
    /// ```no_run
    /// use common_redis::{RedisClient, RedisClientConfig};
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let client = RedisClient::with_config(
    ///     RedisClientConfig::new("redis://localhost:6379")
    ///         .with_timeouts(Some(Duration::from_millis(100)), Some(Duration::from_millis(5000)))
    ///         .with_log_timings(true),
    /// )
    /// .await
    /// .unwrap();
    /// # }
    /// ```
    pub async fn with_config(config: RedisClientConfig) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(config.url)?;

        // Validate that Duration::ZERO is not passed - use None instead
        if let Some(timeout) = config.response_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }
        if let Some(timeout) = config.connection_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }

        let mut connection_config = redis::AsyncConnectionConfig::new();

        if let Some(timeout) = config.response_timeout {
            connection_config = connection_config.set_response_timeout(timeout);
        }

        if let Some(timeout) = config.connection_timeout {
            connection_config = connection_config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&connection_config)
            .await?;

        Ok(RedisClient {
            connection,
            log_timings: config.log_timings,
        })
    }

    fn start_timer(&self) -> Option<Instant> {
        self.log_timings.then(Instant::now)
    }

    fn log_timing(op: &'static str, key_count: usize, started: Option<Instant>) {
        if let Some(started) = started {
            info!(
                op,
                key_count,
                elapsed_us = started.elapsed().as_micros() as u64,
                "redis command timing"
            );
        }
    }
}

/// Redis expiry is whole seconds; round partial seconds up so a short TTL never
/// becomes "no expiry". A zero TTL means the key never expires.
pub(crate) fn expiry_seconds(ttl: Option<Duration>) -> Option<u64> {
    match ttl {
        Some(ttl) if !ttl.is_zero() => {
            Some(ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0)))
        }
        _ => None,
    }
}

/// `EXPIRE` takes a signed seconds count.
pub(crate) fn expire_seconds(ttl: Duration) -> Result<i64, CustomRedisError> {
    let Some(seconds) = expiry_seconds(Some(ttl)) else {
        return Err(CustomRedisError::InvalidConfiguration(
            "expire requires a non-zero TTL".to_string(),
        ));
    };
    i64::try_from(seconds).map_err(|_| {
        CustomRedisError::InvalidConfiguration(format!("TTL of {seconds}s is out of range"))
    })
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, k: String) -> Result<Option<Vec<u8>>, CustomRedisError> {
        let started = self.start_timer();
        let mut conn = self.connection.clone();
        let result: Option<Vec<u8>> = conn.get(k).await?;
        Self::log_timing("get", 1, started);
        Ok(result)
    }

    async fn set(
        &self,
        k: String,
        v: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CustomRedisError> {
        let started = self.start_timer();
        let mut conn = self.connection.clone();
        match expiry_seconds(ttl) {
            Some(seconds) => conn.set_ex::<_, _, ()>(k, v, seconds).await?,
            None => conn.set::<_, _, ()>(k, v).await?,
        }
        Self::log_timing("set", 1, started);
        Ok(())
    }

    async fn mget(&self, keys: Vec<String>) -> Result<Vec<Option<Vec<u8>>>, CustomRedisError> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let started = self.start_timer();
        let mut conn = self.connection.clone();
        let results: Vec<Option<Vec<u8>>> = conn.mget(&keys).await?;
        Self::log_timing("mget", keys.len(), started);
        Ok(results)
    }

    async fn mset(
        &self,
        ttl: Option<Duration>,
        items: Vec<(String, Vec<u8>)>,
    ) -> Result<(), CustomRedisError> {
        if items.is_empty() {
            return Ok(());
        }
        let started = self.start_timer();

        let mut mset = redis::cmd("MSET");
        for (k, v) in &items {
            mset.arg(k).arg(v);
        }

        let mut pipe = redis::pipe();
        pipe.add_command(mset).ignore();
        if let Some(seconds) = expiry_seconds(ttl) {
            for (k, _) in &items {
                pipe.cmd("EXPIRE").arg(k).arg(seconds).ignore();
            }
        }

        let mut conn = self.connection.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Self::log_timing("mset", items.len(), started);
        Ok(())
    }

    async fn del(&self, keys: Vec<String>) -> Result<u64, CustomRedisError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let started = self.start_timer();
        let mut conn = self.connection.clone();
        let removed: u64 = conn.del(&keys).await?;
        Self::log_timing("del", keys.len(), started);
        Ok(removed)
    }

    async fn expire(&self, k: String, ttl: Duration) -> Result<bool, CustomRedisError> {
        let seconds = expire_seconds(ttl)?;
        let mut conn = self.connection.clone();
        let applied: bool = conn.expire(k, seconds).await?;
        Ok(applied)
    }

    async fn incr_by(&self, k: String, step: i64) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(k, step).await?;
        Ok(value)
    }

    async fn decr_by(&self, k: String, step: i64) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.decr(k, step).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
