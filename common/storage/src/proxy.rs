//! Two-tier cache-aside storage.
//!
//! A [`StorageProxy`] pairs a fast *preferred* tier (a cache) with an
//! authoritative *backup* tier. Reads go to the preferred tier first and fall
//! back to the backup, repopulating the preferred tier with what they find.
//! Writes go to both tiers in a fixed order and are not transactional: if the
//! second tier fails the first has already been changed, and the caller has
//! to treat the state of that key as unknown.
//!
//! | operation   | order                | on second-tier failure         |
//! |-------------|----------------------|--------------------------------|
//! | `set`       | preferred, backup    | error, preferred already set   |
//! | `multi_set` | preferred, backup    | error, preferred already set   |
//! | `add`       | backup, preferred    | error, backup already added    |
//! | `delete`    | backup, preferred    | error, backup already deleted  |
//! | `incr/decr` | preferred, backup    | `PartialCounter` with the preferred value |

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::counter_storage::CounterStorage;
use crate::errors::StorageError;
use crate::key::Key;
use crate::metrics_consts::{PROXY_BACKFILL_ERROR_COUNTER, PROXY_READ_COUNTER};
use crate::storage::{AssignedKey, Storage};

pub struct StorageProxy<P, B, T> {
    preferred: P,
    backup: B,
    _value: PhantomData<fn() -> T>,
}

impl<P, B, T> StorageProxy<P, B, T> {
    pub fn new(preferred: P, backup: B) -> Self {
        Self {
            preferred,
            backup,
            _value: PhantomData,
        }
    }

    pub fn preferred(&self) -> &P {
        &self.preferred
    }

    pub fn backup(&self) -> &B {
        &self.backup
    }
}

#[async_trait]
impl<P, B, T> Storage<T> for StorageProxy<P, B, T>
where
    P: Storage<T>,
    B: Storage<T>,
    T: AssignedKey + Send + Sync + 'static,
{
    async fn get(&self, key: &Key) -> Result<T, StorageError> {
        match self.preferred.get(key).await {
            Ok(value) => {
                metrics::counter!(PROXY_READ_COUNTER, "source" => "preferred").increment(1);
                return Ok(value);
            }
            Err(e) if e.is_miss() => debug!(key = %key, "preferred tier miss"),
            Err(e) => return Err(e),
        }

        let value = match self.backup.get(key).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_miss() {
                    metrics::counter!(PROXY_READ_COUNTER, "source" => "miss").increment(1);
                }
                return Err(e);
            }
        };
        metrics::counter!(PROXY_READ_COUNTER, "source" => "backup").increment(1);

        if let Err(e) = self.preferred.set(key, &value).await {
            metrics::counter!(PROXY_BACKFILL_ERROR_COUNTER).increment(1);
            return Err(e);
        }
        Ok(value)
    }

    async fn set(&self, key: &Key, value: &T) -> Result<(), StorageError> {
        self.preferred.set(key, value).await?;
        self.backup.set(key, value).await
    }

    async fn add(&self, key: &Key, value: &mut T) -> Result<(), StorageError> {
        self.backup.add(key, value).await?;

        // The backup tier may have given the value its identity.
        let assigned = value.assigned_key();
        if let Some(assigned) = &assigned {
            debug!(key = %key, assigned = %assigned, "backup tier assigned a new key");
        }
        let key = assigned.as_ref().unwrap_or(key);
        self.preferred.add(key, value).await
    }

    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, T>, StorageError> {
        let mut found = match self.preferred.multi_get(keys).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    error = %e,
                    retryable = e.is_retryable(),
                    "preferred tier failed, reading batch from backup"
                );
                HashMap::new()
            }
        };

        let mut seen = HashSet::with_capacity(keys.len());
        let missing: Vec<Key> = keys
            .iter()
            .filter(|key| !found.contains_key(*key) && seen.insert(*key))
            .cloned()
            .collect();
        metrics::counter!(PROXY_READ_COUNTER, "source" => "preferred")
            .increment(found.len() as u64);
        if missing.is_empty() {
            return Ok(found);
        }

        let from_backup = self.backup.multi_get(&missing).await?;
        metrics::counter!(PROXY_READ_COUNTER, "source" => "backup")
            .increment(from_backup.len() as u64);
        metrics::counter!(PROXY_READ_COUNTER, "source" => "miss")
            .increment(missing.len().saturating_sub(from_backup.len()) as u64);

        if !from_backup.is_empty() {
            if let Err(e) = self.preferred.multi_set(&from_backup).await {
                warn!(
                    error = %e,
                    retryable = e.is_retryable(),
                    count = from_backup.len(),
                    "failed to backfill preferred tier"
                );
                metrics::counter!(PROXY_BACKFILL_ERROR_COUNTER).increment(1);
            }
        }

        found.extend(from_backup);
        Ok(found)
    }

    async fn multi_set(&self, values: &HashMap<Key, T>) -> Result<(), StorageError> {
        self.preferred.multi_set(values).await?;
        self.backup.multi_set(values).await
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        self.backup.delete(keys).await?;
        self.preferred.delete(keys).await
    }
}

#[async_trait]
impl<P, B> CounterStorage for StorageProxy<P, B, i64>
where
    P: CounterStorage,
    B: CounterStorage,
{
    async fn incr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        let value = self.preferred.incr(key, step).await?;
        self.backup
            .incr(key, step)
            .await
            .map_err(|e| StorageError::PartialCounter {
                value,
                source: Box::new(e),
            })
    }

    async fn decr(&self, key: &Key, step: i64) -> Result<i64, StorageError> {
        let value = self.preferred.decr(key, step).await?;
        self.backup
            .decr(key, step)
            .await
            .map_err(|e| StorageError::PartialCounter {
                value,
                source: Box::new(e),
            })
    }
}
