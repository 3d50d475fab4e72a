use common_redis::{CustomRedisError, RetryMethod};
use thiserror::Error;

use crate::encoding::EncodingError;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The key holds no value. This is an expected outcome that drives backfill,
    /// not a failure.
    #[error("key {0} does not exist")]
    EmptyObject(String),

    #[error("invalid key: {0}")]
    KeyBuild(String),

    #[error("failed to encode value: {source}")]
    Encode {
        #[source]
        source: EncodingError,
    },

    #[error("failed to decode value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: EncodingError,
    },

    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: CustomRedisError,
    },

    #[error("counter {key} would drop below zero")]
    CounterUnderflow { key: String },

    /// The preferred tier applied the counter change but the backup tier did not.
    #[error("counter updated to {value} on the preferred tier only: {source}")]
    PartialCounter {
        value: i64,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn driver(context: impl Into<String>, source: CustomRedisError) -> Self {
        StorageError::Driver {
            context: context.into(),
            source,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, StorageError::EmptyObject(_))
    }

    /// How the failed call may be retried, as classified by the driver.
    /// Errors that did not come from the driver are never worth retrying.
    pub fn retry_method(&self) -> RetryMethod {
        match self {
            StorageError::Driver { source, .. } => source.retry_method(),
            StorageError::PartialCounter { source, .. } => source.retry_method(),
            _ => RetryMethod::NoRetry,
        }
    }

    /// `true` when the failure is transient, such as a timeout or a dropped
    /// connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Driver { source, .. } => !source.is_unrecoverable_error(),
            StorageError::PartialCounter { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The counter value a failed `incr`/`decr` still reports, if any.
    ///
    /// An underflowing decrement reports zero; a partial proxy update reports
    /// the value the preferred tier reached.
    pub fn counter_value(&self) -> Option<i64> {
        match self {
            StorageError::CounterUnderflow { .. } => Some(0),
            StorageError::PartialCounter { value, .. } => Some(*value),
            _ => None,
        }
    }
}
