use std::sync::Arc;
use std::time::Duration;

use common_redis::{Client, CustomRedisError, RedisClient, RedisClientConfig};
use envconfig::Envconfig;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::counter_storage::CounterRedisStorage;
use crate::encoding::{Codec, EncodingKind};
use crate::key::KeyPrefix;
use crate::redis_storage::RedisStorage;

#[derive(Envconfig, Clone, Debug)]
pub struct StorageConfig {
    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,

    // 0 disables the timeout
    #[envconfig(from = "REDIS_RESPONSE_TIMEOUT_MS", default = "100")]
    pub redis_response_timeout_ms: u64,

    #[envconfig(from = "REDIS_CONNECTION_TIMEOUT_MS", default = "5000")]
    pub redis_connection_timeout_ms: u64,

    #[envconfig(from = "REDIS_LOG_TIMINGS", default = "false")]
    pub redis_log_timings: bool,

    #[envconfig(from = "STORAGE_KEY_PREFIX", default = "storage")]
    pub storage_key_prefix: String,

    // 0 means values never expire
    #[envconfig(from = "STORAGE_TTL_SECONDS", default = "0")]
    pub storage_ttl_seconds: u64,

    #[envconfig(from = "STORAGE_ENCODING", default = "json")]
    pub storage_encoding: EncodingKind,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl StorageConfig {
    pub fn default_test_config() -> Self {
        Self {
            redis_url: "redis://localhost:6379/".to_string(),
            redis_response_timeout_ms: 100,
            redis_connection_timeout_ms: 5000,
            redis_log_timings: false,
            storage_key_prefix: "test".to_string(),
            storage_ttl_seconds: 0,
            storage_encoding: EncodingKind::Json,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        (self.storage_ttl_seconds > 0).then(|| Duration::from_secs(self.storage_ttl_seconds))
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        millis(self.redis_response_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        millis(self.redis_connection_timeout_ms)
    }

    pub fn key_prefix(&self) -> KeyPrefix {
        KeyPrefix::new(&self.storage_key_prefix)
    }

    pub fn redis_client_config(&self) -> RedisClientConfig {
        RedisClientConfig::new(self.redis_url.clone())
            .with_timeouts(self.response_timeout(), self.connection_timeout())
            .with_log_timings(self.redis_log_timings)
    }

    pub async fn build_client(&self) -> Result<RedisClient, CustomRedisError> {
        self.redis_client_config().build().await
    }

    /// A tier using the configured prefix, TTL and encoding.
    pub fn storage<T>(&self, client: Arc<dyn Client + Send + Sync>) -> RedisStorage<T>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        RedisStorage::new(
            client,
            Codec::new(self.storage_encoding.encoding::<T>()),
            self.key_prefix(),
            self.ttl(),
        )
    }

    pub fn counter_storage(&self, client: Arc<dyn Client + Send + Sync>) -> CounterRedisStorage {
        CounterRedisStorage::new(client, self.key_prefix(), self.ttl())
    }
}

pub static DEFAULT_TEST_CONFIG: Lazy<StorageConfig> = Lazy::new(StorageConfig::default_test_config);
