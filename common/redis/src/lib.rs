//! Backing-store driver contract for the tiered storage crates.
//!
//! The [`Client`] trait is the minimal key/value surface the storage layer needs:
//! byte values addressed by string keys, batched reads and writes, expiry and
//! server-side atomic counters. [`RedisClient`] implements it over a multiplexed
//! Redis connection and [`MockRedisClient`] implements it in memory for tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// Re-export ErrorKind and RetryMethod so consumers can construct CustomRedisError in tests
// and understand retry behavior
pub use redis::ErrorKind as RedisErrorKind;
pub use redis::RetryMethod;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl CustomRedisError {
    /// Create a Redis error from an ErrorKind (primarily for testing)
    pub fn from_redis_kind(kind: redis::ErrorKind, description: &'static str) -> Self {
        CustomRedisError::Redis(Arc::new(redis::RedisError::from((kind, description))))
    }

    /// Determine if this error is unrecoverable and should not be retried
    ///
    /// Returns `true` for configuration errors and permanent failures.
    /// Returns `false` for transient network/connection issues that may resolve on retry.
    pub fn is_unrecoverable_error(&self) -> bool {
        match self {
            CustomRedisError::Timeout => false,
            CustomRedisError::InvalidConfiguration(_) => true,
            CustomRedisError::ParseError(_) => true,
            // NotFound is permanent - the storage layer turns it into a miss
            CustomRedisError::NotFound => true,
            CustomRedisError::Redis(err) => {
                Self::is_config_error(err) || err.is_unrecoverable_error()
            }
        }
    }

    fn is_config_error(err: &redis::RedisError) -> bool {
        matches!(
            err.kind(),
            redis::ErrorKind::InvalidClientConfig | redis::ErrorKind::AuthenticationFailed
        )
    }

    /// Retry policy belongs to the driver, never to the storage layer on top of it.
    /// This tells a caller that wraps a [`Client`] how a failed command may be retried.
    pub fn retry_method(&self) -> RetryMethod {
        match self {
            CustomRedisError::Timeout => RetryMethod::WaitAndRetry,
            CustomRedisError::InvalidConfiguration(_) => RetryMethod::NoRetry,
            CustomRedisError::ParseError(_) => RetryMethod::NoRetry,
            CustomRedisError::NotFound => RetryMethod::NoRetry,
            CustomRedisError::Redis(err) => {
                if Self::is_config_error(err) {
                    RetryMethod::NoRetry
                } else {
                    err.retry_method()
                }
            }
        }
    }
}

/// Minimal key/value surface of a cache server.
///
/// Keys are fully built cache keys; values are opaque bytes. A `ttl` of `None`
/// stores the value without expiry.
#[async_trait]
pub trait Client {
    /// Returns `Ok(None)` when the key is absent.
    async fn get(&self, k: String) -> Result<Option<Vec<u8>>, CustomRedisError>;

    async fn set(
        &self,
        k: String,
        v: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CustomRedisError>;

    /// Results are aligned with `keys`; absent keys yield `None`.
    async fn mget(&self, keys: Vec<String>) -> Result<Vec<Option<Vec<u8>>>, CustomRedisError>;

    /// Writes every pair in one batch, then applies `ttl` to each written key.
    async fn mset(
        &self,
        ttl: Option<Duration>,
        items: Vec<(String, Vec<u8>)>,
    ) -> Result<(), CustomRedisError>;

    /// Returns the number of keys that were removed.
    async fn del(&self, keys: Vec<String>) -> Result<u64, CustomRedisError>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, k: String, ttl: Duration) -> Result<bool, CustomRedisError>;

    async fn incr_by(&self, k: String, step: i64) -> Result<i64, CustomRedisError>;

    async fn decr_by(&self, k: String, step: i64) -> Result<i64, CustomRedisError>;

    async fn ping(&self) -> Result<(), CustomRedisError>;
}

// Module declarations
mod client;
mod mock;

// Re-export public APIs
pub use client::{RedisClient, RedisClientConfig};
pub use mock::{MockRedisCall, MockRedisClient, MockRedisValue};
