use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::encoding::RawBytes;
use crate::errors::StorageError;
use crate::key::Key;

/// A single tier of typed key/value storage.
///
/// A missing key is reported as [`StorageError::EmptyObject`] by `get`; batch
/// reads simply leave missing keys out of the returned map.
#[async_trait]
pub trait Storage<T>: Send + Sync
where
    T: Send + Sync,
{
    async fn get(&self, key: &Key) -> Result<T, StorageError>;

    async fn set(&self, key: &Key, value: &T) -> Result<(), StorageError>;

    /// Insert a new value. Tiers that assign identity may rewrite `value`
    /// (for example to record the key they picked).
    async fn add(&self, key: &Key, value: &mut T) -> Result<(), StorageError>;

    /// Entries that are missing or cannot be decoded are absent from the result.
    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, T>, StorageError>;

    /// Entries whose key or value cannot be encoded are skipped.
    async fn multi_set(&self, values: &HashMap<Key, T>) -> Result<(), StorageError>;

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError>;
}

#[async_trait]
impl<T, S> Storage<T> for Arc<S>
where
    T: Send + Sync,
    S: Storage<T> + ?Sized,
{
    async fn get(&self, key: &Key) -> Result<T, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &Key, value: &T) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }

    async fn add(&self, key: &Key, value: &mut T) -> Result<(), StorageError> {
        (**self).add(key, value).await
    }

    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, T>, StorageError> {
        (**self).multi_get(keys).await
    }

    async fn multi_set(&self, values: &HashMap<Key, T>) -> Result<(), StorageError> {
        (**self).multi_set(values).await
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        (**self).delete(keys).await
    }
}

/// A value whose storage key may differ from the key it was added under,
/// typically because a tier assigned it an identity on insert.
pub trait KeyChangeable {
    fn is_key_changeable(&self) -> bool;
}

/// A value that knows the key it should be stored under.
pub trait KeyGetter {
    fn key(&self) -> Key;
}

/// Asked by [`StorageProxy::add`](crate::StorageProxy) after the backup tier
/// has stored the value: `Some(key)` makes the proxy write the preferred tier
/// under `key` instead of the caller's key.
///
/// Values with no assigned identity keep the default. Values that have one
/// implement [`KeyChangeable`] and [`KeyGetter`] and forward to [`changed_key`]:
///
/// ```rust,ignore
/// impl AssignedKey for Account {
///     fn assigned_key(&self) -> Option<Key> {
///         changed_key(self)
///     }
/// }
/// ```
pub trait AssignedKey {
    fn assigned_key(&self) -> Option<Key> {
        None
    }
}

/// The value's own key, if it reports that the key changed.
pub fn changed_key<T: KeyChangeable + KeyGetter>(value: &T) -> Option<Key> {
    value.is_key_changeable().then(|| value.key())
}

macro_rules! no_assigned_key {
    ($($t:ty),*) => { $(impl AssignedKey for $t {})* };
}

no_assigned_key!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, RawBytes
);

impl<T> AssignedKey for Vec<T> {}

impl<T> AssignedKey for Option<T> {}

impl<K, V, S> AssignedKey for HashMap<K, V, S> {}
