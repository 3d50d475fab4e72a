//! Keys and the cache keys built from them.
//!
//! A cache key is `<prefix>_<key>`. Prefixes never contain `_` (it is replaced by
//! `~` when a [`KeyPrefix`] is built), so the first `_` of a cache key always
//! separates the prefix from the key. Existing cached data depends on this
//! format; do not change it.

use std::fmt::{self, Display};

use crate::errors::StorageError;

const SEPARATOR: char = '_';
const PREFIX_ESCAPE: char = '~';

/// Identifier of a stored value.
///
/// `Int(5)` and `Str("5")` have the same canonical string and therefore address
/// the same entry in a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn int(i: i64) -> Self {
        Key::Int(i)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Key::Str(s.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

/// Tier-wide key prefix with `_` normalized to `~`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        KeyPrefix(prefix.as_ref().replace(SEPARATOR, &PREFIX_ESCAPE.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyPrefix {
    fn from(s: &str) -> Self {
        KeyPrefix::new(s)
    }
}

pub fn build_cache_key(prefix: &KeyPrefix, key: &Key) -> Result<String, StorageError> {
    let key = key.to_string();
    if key.is_empty() {
        return Err(StorageError::KeyBuild(
            "key should not be empty".to_string(),
        ));
    }
    Ok(format!("{}{SEPARATOR}{key}", prefix.0))
}

pub fn build_int_cache_key(prefix: &KeyPrefix, key: i64) -> String {
    format!("{}{SEPARATOR}{key}", prefix.0)
}

pub fn build_str_cache_key(prefix: &KeyPrefix, key: &str) -> String {
    format!("{}{SEPARATOR}{key}", prefix.0)
}

/// Recover the key part of a cache key. The result is always a `Key::Str`,
/// since the cache key does not record which variant built it.
pub fn raw_key(cache_key: &str) -> Option<Key> {
    cache_key
        .split_once(SEPARATOR)
        .filter(|(_, key)| !key.is_empty())
        .map(|(_, key)| Key::Str(key.to_string()))
}

pub fn keys_from_ints<I>(ints: I) -> Vec<Key>
where
    I: IntoIterator,
    I::Item: Into<i64>,
{
    ints.into_iter().map(|i| Key::Int(i.into())).collect()
}

pub fn keys_from_strings<I>(strings: I) -> Vec<Key>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    strings.into_iter().map(|s| Key::Str(s.into())).collect()
}

/// Fails on the first key that is not an `Int`.
pub fn keys_to_ints(keys: &[Key]) -> Result<Vec<i64>, StorageError> {
    keys.iter()
        .map(|key| {
            key.as_int()
                .ok_or_else(|| StorageError::KeyBuild(format!("key {key} is not an integer key")))
        })
        .collect()
}

pub fn keys_to_strings(keys: &[Key]) -> Vec<String> {
    keys.iter().map(Key::to_string).collect()
}
