use async_trait::async_trait;
use common_redis::{Client, CustomRedisError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::encoding::Codec;
use crate::errors::StorageError;
use crate::key::{build_cache_key, Key, KeyPrefix};
use crate::metrics_consts::BATCH_SKIPPED_COUNTER;
use crate::storage::Storage;

/// One storage tier backed by a [`Client`].
///
/// Every value is written under `<prefix>_<key>` with the tier's TTL.
pub struct RedisStorage<T> {
    client: Arc<dyn Client + Send + Sync>,
    codec: Codec<T>,
    prefix: KeyPrefix,
    ttl: Option<Duration>,
}

impl<T> RedisStorage<T> {
    /// A zero `ttl` is the same as `None`: values never expire.
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        codec: Codec<T>,
        prefix: KeyPrefix,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            client,
            codec,
            prefix,
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn cache_key(&self, key: &Key) -> Result<String, StorageError> {
        build_cache_key(&self.prefix, key)
    }

    pub(crate) fn client(&self) -> &Arc<dyn Client + Send + Sync> {
        &self.client
    }

    async fn write(&self, key: &Key, value: &T) -> Result<(), StorageError> {
        let data = self
            .codec
            .marshal(value)
            .map_err(|source| StorageError::Encode { source })?;
        let cache_key = self.cache_key(key)?;
        self.client
            .set(cache_key.clone(), data, self.ttl)
            .await
            .map_err(|e| StorageError::driver(format!("set {cache_key}"), e))
    }
}

#[async_trait]
impl<T> Storage<T> for RedisStorage<T>
where
    T: Send + Sync + 'static,
{
    async fn get(&self, key: &Key) -> Result<T, StorageError> {
        let cache_key = self.cache_key(key)?;
        let data = match self.client.get(cache_key.clone()).await {
            Ok(Some(data)) if !data.is_empty() => data,
            Ok(_) | Err(CustomRedisError::NotFound) => {
                return Err(StorageError::EmptyObject(key.to_string()))
            }
            Err(e) => return Err(StorageError::driver(format!("get {cache_key}"), e)),
        };
        self.codec
            .unmarshal(&data)
            .map_err(|source| StorageError::Decode {
                key: cache_key,
                source,
            })
    }

    async fn set(&self, key: &Key, value: &T) -> Result<(), StorageError> {
        self.write(key, value).await
    }

    async fn add(&self, key: &Key, value: &mut T) -> Result<(), StorageError> {
        self.write(key, value).await
    }

    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, T>, StorageError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let cache_keys = keys
            .iter()
            .map(|key| self.cache_key(key))
            .collect::<Result<Vec<_>, _>>()?;

        let payloads = match self.client.mget(cache_keys.clone()).await {
            Ok(payloads) => payloads,
            Err(CustomRedisError::NotFound) => return Ok(HashMap::new()),
            Err(e) => return Err(StorageError::driver("mget", e)),
        };

        let mut found = HashMap::with_capacity(keys.len());
        for ((key, cache_key), payload) in keys.iter().zip(&cache_keys).zip(payloads) {
            let Some(data) = payload.filter(|data| !data.is_empty()) else {
                continue;
            };
            match self.codec.unmarshal(&data) {
                Ok(value) => {
                    found.insert(key.clone(), value);
                }
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "skipping undecodable entry");
                    metrics::counter!(BATCH_SKIPPED_COUNTER, "op" => "multi_get").increment(1);
                }
            }
        }
        Ok(found)
    }

    async fn multi_set(&self, values: &HashMap<Key, T>) -> Result<(), StorageError> {
        let mut items = Vec::with_capacity(values.len());
        for (key, value) in values {
            let cache_key = match self.cache_key(key) {
                Ok(cache_key) => cache_key,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping entry with invalid key");
                    metrics::counter!(BATCH_SKIPPED_COUNTER, "op" => "multi_set").increment(1);
                    continue;
                }
            };
            match self.codec.marshal(value) {
                Ok(data) => items.push((cache_key, data)),
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "skipping unencodable entry");
                    metrics::counter!(BATCH_SKIPPED_COUNTER, "op" => "multi_set").increment(1);
                }
            }
        }
        if items.is_empty() {
            return Ok(());
        }
        self.client
            .mset(self.ttl, items)
            .await
            .map_err(|e| StorageError::driver("mset", e))
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let cache_keys = keys
            .iter()
            .map(|key| self.cache_key(key))
            .collect::<Result<Vec<_>, _>>()?;
        self.client
            .del(cache_keys)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::driver("del", e))
    }
}
