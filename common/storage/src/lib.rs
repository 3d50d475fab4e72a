//! Typed, tiered key/value storage.
//!
//! This crate layers typed storage on top of the [`common_redis::Client`] driver:
//!
//! - [`RedisStorage`]: one tier, values encoded with a pluggable [`Encoding`]
//! - [`CounterRedisStorage`]: integer counters updated atomically by the server
//! - [`StorageProxy`]: a cache-aside pair of a preferred and a backup tier, with
//!   read-through backfill
//!
//! # Example
//!
//! ```rust,ignore
//! use common_storage::{Key, Storage, StorageConfig, StorageProxy};
//!
//! let config = StorageConfig::init_from_env()?;
//! let cache = Arc::new(config.build_client().await?);
//! let proxy = StorageProxy::new(
//!     config.storage::<User>(cache),
//!     users_table,
//! );
//!
//! // A miss on the cache reads `users_table` and writes the result back to the cache.
//! let user = proxy.get(&Key::Int(42)).await?;
//! ```

pub mod config;
pub mod counter_storage;
pub mod encoding;
pub mod errors;
pub mod key;
pub mod metrics_consts;
pub mod proxy;
pub mod redis_storage;
pub mod storage;

pub use config::StorageConfig;
pub use counter_storage::{CounterRedisStorage, CounterStorage};
pub use encoding::{
    BinaryMarshaler, BinaryUnmarshaler, BincodeEncoding, Codec, Encoding, EncodingError,
    EncodingKind, IntegerEncoding, JsonEncoding, JsonGzipEncoding, JsonSnappyEncoding,
    MsgPackEncoding, RawBytes, StringEncoding,
};
pub use errors::StorageError;
pub use key::{build_cache_key, Key, KeyPrefix};
pub use proxy::StorageProxy;
pub use redis_storage::RedisStorage;
pub use storage::{changed_key, AssignedKey, KeyChangeable, KeyGetter, Storage};
