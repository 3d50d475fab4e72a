//! Value encodings.
//!
//! An [`Encoding`] turns a value into the bytes kept in a backing store and back.
//! The bytes carry no tag naming the encoding, so writers and readers of the
//! same prefix must be configured with the same one.
//!
//! [`Codec`] is what the storage tiers actually call. It pairs the configured
//! encoding with the value's own binary representation ([`BinaryMarshaler`] /
//! [`BinaryUnmarshaler`]) and applies them in a fixed order:
//!
//! 1. no encoding configured: use the binary representation
//! 2. encoding configured: use it, and only if it fails retry with the binary representation
//! 3. otherwise: fail

use std::fmt::Display;
use std::io::{Read, Write};
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),
    #[error("snappy error: {0}")]
    Snappy(#[from] snap::Error),
    #[error("cannot parse {input:?} as {target}: {reason}")]
    Parse {
        input: String,
        target: &'static str,
        reason: String,
    },
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("binary representation error: {0}")]
    Native(String),
    #[error("no encoding configured and the value has no binary representation")]
    NotConfigured,
}

pub trait Encoding<T>: Send + Sync {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError>;
    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError>;
}

/// Plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoding;

impl<T: Serialize + DeserializeOwned> Encoding<T> for JsonEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// JSON compressed with gzip at the best compression level.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGzipEncoding;

impl<T: Serialize + DeserializeOwned> Encoding<T> for JsonGzipEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        let json = serde_json::to_vec(value)?;
        gzip_encode(&json)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        let json = gzip_decode(data)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// JSON compressed with raw (unframed) snappy.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnappyEncoding;

impl<T: Serialize + DeserializeOwned> Encoding<T> for JsonSnappyEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        let json = serde_json::to_vec(value)?;
        snappy_encode(&json)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        let json = snappy_decode(data)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// MessagePack with structs written as arrays, so no field names are stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackEncoding;

impl<T: Serialize + DeserializeOwned> Encoding<T> for MsgPackEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        Ok(rmp_serde::to_vec(value)?)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Fixed-layout binary encoding. Only readable by the same type definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEncoding;

impl<T: Serialize + DeserializeOwned> Encoding<T> for BincodeEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        Ok(bincode::serialize(value)?)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Primitive integers that are stored as decimal text.
pub trait IntegerValue: Display + FromStr<Err = ParseIntError> + Copy {}

macro_rules! integer_values {
    ($($t:ty),*) => { $(impl IntegerValue for $t {})* };
}

integer_values!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Decimal ASCII for bare integers, the same text a Redis counter holds.
///
/// Decoding never coerces: text that does not parse as the target type,
/// including out-of-range values, is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerEncoding;

impl<T: IntegerValue> Encoding<T> for IntegerEncoding {
    fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        Ok(value.to_string().into_bytes())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        let text = std::str::from_utf8(data).map_err(|e| EncodingError::Parse {
            input: String::from_utf8_lossy(data).into_owned(),
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })?;
        text.parse::<T>().map_err(|e| EncodingError::Parse {
            input: text.to_string(),
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }
}

/// Bare UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringEncoding;

impl Encoding<String> for StringEncoding {
    fn marshal(&self, value: &String) -> Result<Vec<u8>, EncodingError> {
        Ok(value.as_bytes().to_vec())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<String, EncodingError> {
        Ok(String::from_utf8(data.to_vec())?)
    }
}

pub fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gzip_decode(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

pub fn snappy_encode(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    Ok(snap::raw::Encoder::new().compress_vec(data)?)
}

pub fn snappy_decode(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    Ok(snap::raw::Decoder::new().decompress_vec(data)?)
}

/// A value that knows how to write itself as bytes.
pub trait BinaryMarshaler {
    fn marshal_binary(&self) -> Result<Vec<u8>, EncodingError>;
}

/// A value that knows how to read itself from bytes.
pub trait BinaryUnmarshaler: Sized {
    fn unmarshal_binary(data: &[u8]) -> Result<Self, EncodingError>;
}

/// Bytes stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBytes(pub Vec<u8>);

impl BinaryMarshaler for RawBytes {
    fn marshal_binary(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(self.0.clone())
    }
}

impl BinaryUnmarshaler for RawBytes {
    fn unmarshal_binary(data: &[u8]) -> Result<Self, EncodingError> {
        Ok(RawBytes(data.to_vec()))
    }
}

type MarshalFn<T> = fn(&T) -> Result<Vec<u8>, EncodingError>;
type UnmarshalFn<T> = fn(&[u8]) -> Result<T, EncodingError>;

/// Configured encoding plus the value's binary representation as fallback.
pub struct Codec<T> {
    encoding: Option<Arc<dyn Encoding<T>>>,
    binary_marshal: Option<MarshalFn<T>>,
    binary_unmarshal: Option<UnmarshalFn<T>>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self {
            encoding: self.encoding.clone(),
            binary_marshal: self.binary_marshal,
            binary_unmarshal: self.binary_unmarshal,
        }
    }
}

impl<T> Codec<T> {
    pub fn new(encoding: Arc<dyn Encoding<T>>) -> Self {
        Self {
            encoding: Some(encoding),
            binary_marshal: None,
            binary_unmarshal: None,
        }
    }

    pub fn from_encoding<E: Encoding<T> + 'static>(encoding: E) -> Self {
        Self::new(Arc::new(encoding))
    }

    /// No encoding; values are written with their own binary representation.
    pub fn binary() -> Self
    where
        T: BinaryMarshaler + BinaryUnmarshaler,
    {
        Self {
            encoding: None,
            binary_marshal: None,
            binary_unmarshal: None,
        }
        .with_binary_fallback()
    }

    pub fn with_binary_marshaler(mut self) -> Self
    where
        T: BinaryMarshaler,
    {
        let marshal: MarshalFn<T> = <T as BinaryMarshaler>::marshal_binary;
        self.binary_marshal = Some(marshal);
        self
    }

    pub fn with_binary_unmarshaler(mut self) -> Self
    where
        T: BinaryUnmarshaler,
    {
        let unmarshal: UnmarshalFn<T> = <T as BinaryUnmarshaler>::unmarshal_binary;
        self.binary_unmarshal = Some(unmarshal);
        self
    }

    pub fn with_binary_fallback(self) -> Self
    where
        T: BinaryMarshaler + BinaryUnmarshaler,
    {
        self.with_binary_marshaler().with_binary_unmarshaler()
    }

    pub fn marshal(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        let Some(encoding) = &self.encoding else {
            return match self.binary_marshal {
                Some(marshal) => marshal(value),
                None => Err(EncodingError::NotConfigured),
            };
        };
        match encoding.marshal(value) {
            Ok(data) => Ok(data),
            Err(err) => match self.binary_marshal {
                Some(marshal) => {
                    debug!(error = %err, "encoding failed, using binary representation");
                    marshal(value)
                }
                None => Err(err),
            },
        }
    }

    pub fn unmarshal(&self, data: &[u8]) -> Result<T, EncodingError> {
        let Some(encoding) = &self.encoding else {
            return match self.binary_unmarshal {
                Some(unmarshal) => unmarshal(data),
                None => Err(EncodingError::NotConfigured),
            };
        };
        match encoding.unmarshal(data) {
            Ok(value) => Ok(value),
            Err(err) => match self.binary_unmarshal {
                Some(unmarshal) => {
                    debug!(error = %err, "decoding failed, using binary representation");
                    unmarshal(data)
                }
                None => Err(err),
            },
        }
    }
}

/// Encoding selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingKind {
    #[default]
    Json,
    JsonGzip,
    JsonSnappy,
    MsgPack,
    Bincode,
}

impl EncodingKind {
    pub fn encoding<T>(&self) -> Arc<dyn Encoding<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        match self {
            EncodingKind::Json => Arc::new(JsonEncoding),
            EncodingKind::JsonGzip => Arc::new(JsonGzipEncoding),
            EncodingKind::JsonSnappy => Arc::new(JsonSnappyEncoding),
            EncodingKind::MsgPack => Arc::new(MsgPackEncoding),
            EncodingKind::Bincode => Arc::new(BincodeEncoding),
        }
    }
}

impl FromStr for EncodingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "json" => Ok(EncodingKind::Json),
            "json_gzip" | "gzip" => Ok(EncodingKind::JsonGzip),
            "json_snappy" | "snappy" => Ok(EncodingKind::JsonSnappy),
            "msgpack" => Ok(EncodingKind::MsgPack),
            "bincode" => Ok(EncodingKind::Bincode),
            _ => Err(format!("Unknown encoding: {s}")),
        }
    }
}
