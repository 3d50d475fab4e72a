use async_trait::async_trait;
use common_redis::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::encoding::{Codec, IntegerEncoding};
use crate::errors::StorageError;
use crate::key::{Key, KeyPrefix};
use crate::redis_storage::RedisStorage;
use crate::storage::Storage;

/// Storage of integer counters that the backing store updates atomically.
#[async_trait]
pub trait CounterStorage: Storage<i64> {
    /// Add `step` and return the new value.
    async fn incr(&self, key: &Key, step: i64) -> Result<i64, StorageError>;

    /// Subtract `step` and return the new value.
    ///
    /// A result below zero is reported as [`StorageError::CounterUnderflow`].
    async fn decr(&self, key: &Key, step: i64) -> Result<i64, StorageError>;
}

#[async_trait]
impl<S> CounterStorage for Arc<S>
where
    S: CounterStorage + ?Sized,
{
    async fn incr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        (**self).incr(key, step).await
    }

    async fn decr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        (**self).decr(key, step).await
    }
}

/// Counters stored as decimal text, so the server's INCRBY/DECRBY can act on them.
pub struct CounterRedisStorage {
    inner: RedisStorage<i64>,
}

impl CounterRedisStorage {
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        prefix: KeyPrefix,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            inner: RedisStorage::new(client, Codec::from_encoding(IntegerEncoding), prefix, ttl),
        }
    }

    pub fn prefix(&self) -> &KeyPrefix {
        self.inner.prefix()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.inner.ttl()
    }

    async fn refresh_ttl(&self, cache_key: String) {
        let Some(ttl) = self.inner.ttl() else {
            return;
        };
        if let Err(e) = self.inner.client().expire(cache_key.clone(), ttl).await {
            warn!(
                key = %cache_key,
                error = %e,
                retryable = !e.is_unrecoverable_error(),
                "failed to refresh counter TTL"
            );
        }
    }
}

#[async_trait]
impl Storage<i64> for CounterRedisStorage {
    async fn get(&self, key: &Key) -> Result<i64, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &Key, value: &i64) -> Result<(), StorageError> {
        self.inner.set(key, value).await
    }

    async fn add(&self, key: &Key, value: &mut i64) -> Result<(), StorageError> {
        self.inner.add(key, value).await
    }

    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, i64>, StorageError> {
        self.inner.multi_get(keys).await
    }

    async fn multi_set(&self, values: &HashMap<Key, i64>) -> Result<(), StorageError> {
        self.inner.multi_set(values).await
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        self.inner.delete(keys).await
    }
}

#[async_trait]
impl CounterStorage for CounterRedisStorage {
    async fn incr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        let cache_key = self.inner.cache_key(key)?;
        let value = self
            .inner
            .client()
            .incr_by(cache_key.clone(), step)
            .await
            .map_err(|e| StorageError::driver(format!("incr {cache_key}"), e))?;
        self.refresh_ttl(cache_key).await;
        Ok(value)
    }

    async fn decr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        let cache_key = self.inner.cache_key(key)?;
        let value = self
            .inner
            .client()
            .decr_by(cache_key.clone(), step)
            .await
            .map_err(|e| StorageError::driver(format!("decr {cache_key}"), e))?;
        if value < 0 {
            return Err(StorageError::CounterUnderflow { key: cache_key });
        }
        self.refresh_ttl(cache_key).await;
        Ok(value)
    }
}
