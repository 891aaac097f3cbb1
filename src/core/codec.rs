//! Value Codecs
//!
//! Converts typed values to and from the opaque [`NetworkValue`] payload
//! carried by every state change. The replication core never looks inside
//! a payload; it only moves it from the sender's codec to the receiver's.
//!
//! The codec is chosen statically per field (a type parameter), so there
//! is no runtime type dispatch. A decode failure means the two ends
//! disagree on the codec or the type and is returned to the caller as-is.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoded payload of a single value or a batch of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkValue(String);

impl NetworkValue {
    /// Wrap an already-encoded payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// Raw payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw payload text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NetworkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding or decoding failed.
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),

    /// Binary payload was not valid hex.
    #[error("invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Encodes and decodes values of any serde type.
pub trait Codec: Send + Sync + 'static {
    /// Encode a value into a payload.
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<NetworkValue, CodecError>;

    /// Decode a payload back into a value.
    fn decode<T: DeserializeOwned>(payload: &NetworkValue) -> Result<T, CodecError>;
}

/// JSON text codec. The default for every field.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<NetworkValue, CodecError> {
        Ok(NetworkValue(serde_json::to_string(value)?))
    }

    fn decode<T: DeserializeOwned>(payload: &NetworkValue) -> Result<T, CodecError> {
        Ok(serde_json::from_str(&payload.0)?)
    }
}

/// Compact binary codec: bincode bytes, hex-encoded to stay a string payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<NetworkValue, CodecError> {
        let bytes = bincode::serialize(value)?;
        Ok(NetworkValue(hex::encode(bytes)))
    }

    fn decode<T: DeserializeOwned>(payload: &NetworkValue) -> Result<T, CodecError> {
        let bytes = hex::decode(&payload.0)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
