use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{Client, CustomRedisError};

#[derive(Debug, Clone)]
struct MockEntry {
    value: Vec<u8>,
    ttl: Option<Duration>,
}

/// In-memory stand-in for a Redis server.
///
/// Clones share the same keyspace, call log and injected failures, so a test can
/// keep one handle for assertions while the code under test owns another.
/// TTLs are recorded but never enforced.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    entries: Arc<Mutex<HashMap<String, MockEntry>>>,
    failures: Arc<Mutex<HashMap<String, CustomRedisError>>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

// A poisoned lock only means another test thread panicked; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing the call log.
    pub fn with_value(&self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        lock(&self.entries).insert(
            key.to_owned(),
            MockEntry {
                value: value.into(),
                ttl: None,
            },
        );
        self.clone()
    }

    /// Make every subsequent call of `op` (e.g. "get", "mset", "incr_by") fail with `err`.
    pub fn fail_op(&self, op: &str, err: CustomRedisError) -> Self {
        lock(&self.failures).insert(op.to_owned(), err);
        self.clone()
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Raw stored bytes, bypassing the call log.
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).map(|e| e.value.clone())
    }

    /// TTL recorded by the last write or expire of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        lock(&self.entries).get(key).and_then(|e| e.ttl)
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        lock(&self.calls).clone()
    }

    pub fn ops(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.op.clone()).collect()
    }

    fn record(&self, op: &str, key: String, value: MockRedisValue) -> Result<(), CustomRedisError> {
        lock(&self.calls).push(MockRedisCall {
            op: op.to_string(),
            key,
            value,
        });
        match lock(&self.failures).get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> Result<i64, CustomRedisError> {
        let mut entries = lock(&self.entries);
        let current = match entries.get(key) {
            Some(entry) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CustomRedisError::from_redis_kind(
                        crate::RedisErrorKind::TypeError,
                        "value is not an integer or out of range",
                    )
                })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            CustomRedisError::from_redis_kind(
                crate::RedisErrorKind::TypeError,
                "increment or decrement would overflow",
            )
        })?;
        let ttl = entries.get(key).and_then(|e| e.ttl);
        entries.insert(
            key.to_owned(),
            MockEntry {
                value: next.to_string().into_bytes(),
                ttl,
            },
        );
        Ok(next)
    }
}

#[derive(Debug, Clone)]
pub enum MockRedisValue {
    None,
    BytesWithTTL(Vec<u8>, Option<Duration>),
    VecString(Vec<String>),
    Expiry(Duration),
    I64(i64),
}

#[derive(Debug, Clone)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: String) -> Result<Option<Vec<u8>>, CustomRedisError> {
        self.record("get", key.clone(), MockRedisValue::None)?;
        Ok(self.value(&key))
    }

    async fn set(
        &self,
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CustomRedisError> {
        self.record(
            "set",
            key.clone(),
            MockRedisValue::BytesWithTTL(value.clone(), ttl),
        )?;
        lock(&self.entries).insert(key, MockEntry { value, ttl });
        Ok(())
    }

    async fn mget(&self, keys: Vec<String>) -> Result<Vec<Option<Vec<u8>>>, CustomRedisError> {
        self.record(
            "mget",
            format!("keys={}", keys.len()),
            MockRedisValue::VecString(keys.clone()),
        )?;
        let entries = lock(&self.entries);
        Ok(keys
            .iter()
            .map(|k| entries.get(k).map(|e| e.value.clone()))
            .collect())
    }

    async fn mset(
        &self,
        ttl: Option<Duration>,
        items: Vec<(String, Vec<u8>)>,
    ) -> Result<(), CustomRedisError> {
        self.record(
            "mset",
            format!("items={}", items.len()),
            MockRedisValue::VecString(items.iter().map(|(k, _)| k.clone()).collect()),
        )?;
        let mut entries = lock(&self.entries);
        for (key, value) in items {
            entries.insert(key, MockEntry { value, ttl });
        }
        Ok(())
    }

    async fn del(&self, keys: Vec<String>) -> Result<u64, CustomRedisError> {
        self.record(
            "del",
            format!("keys={}", keys.len()),
            MockRedisValue::VecString(keys.clone()),
        )?;
        let mut entries = lock(&self.entries);
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count() as u64)
    }

    async fn expire(&self, key: String, ttl: Duration) -> Result<bool, CustomRedisError> {
        self.record("expire", key.clone(), MockRedisValue::Expiry(ttl))?;
        match lock(&self.entries).get_mut(&key) {
            Some(entry) => {
                entry.ttl = Some(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr_by(&self, key: String, step: i64) -> Result<i64, CustomRedisError> {
        self.record("incr_by", key.clone(), MockRedisValue::I64(step))?;
        self.add_to_counter(&key, step)
    }

    async fn decr_by(&self, key: String, step: i64) -> Result<i64, CustomRedisError> {
        self.record("decr_by", key.clone(), MockRedisValue::I64(step))?;
        let delta = step.checked_neg().ok_or_else(|| {
            CustomRedisError::from_redis_kind(
                crate::RedisErrorKind::TypeError,
                "decrement would overflow",
            )
        })?;
        self.add_to_counter(&key, delta)
    }

    async fn ping(&self) -> Result<(), CustomRedisError> {
        self.record("ping", String::new(), MockRedisValue::None)
    }
}
