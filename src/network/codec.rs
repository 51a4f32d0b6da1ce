//! JSON codec for wire messages.
//!
//! All payloads crossing a transport are JSON. This module is the single place that turns a
//! [`Message`] (or any serde type) into bytes and back, so every transport agrees on the encoding.
//!
//! # Examples
//!
//! ```
//! use rampart::network::codec::{decode, encode};
//! use rampart::{Message, PlayerId};
//!
//! let msg = Message::Join { player_id: PlayerId::from("p3") };
//! let bytes = encode(&msg).expect("encoding should succeed");
//! assert_eq!(bytes, br#"{"type":"join","playerId":"p3"}"#);
//!
//! let decoded: Message = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(msg, decoded);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use crate::network::messages::Message;

/// Represents what operation was being performed when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a network message.
    EncodeMessage,
    /// Decoding a network message.
    DecodeMessage,
    /// Appending to a buffer.
    AppendToBuffer,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeMessage => write!(f, "encoding network message"),
            Self::DecodeMessage => write!(f, "decoding network message"),
            Self::AppendToBuffer => write!(f, "appending to buffer"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// `serde_json` reports failures as formatted text with a line and column, which is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying serializer message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying deserializer message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>` of compact JSON.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Encodes a value by appending its JSON to an existing `Vec<u8>`.
///
/// Returns the number of bytes written.
///
/// ```
/// use rampart::network::codec::encode_append;
///
/// let mut buffer = Vec::new();
/// encode_append(&42u32, &mut buffer).expect("encoding should succeed");
/// encode_append(&"hello", &mut buffer).expect("encoding should succeed");
/// assert_eq!(buffer, br#"42"hello""#);
/// ```
pub fn encode_append<T: Serialize>(value: &T, buffer: &mut Vec<u8>) -> CodecResult<usize> {
    let start_len = buffer.len();
    serde_json::to_writer(&mut *buffer, value)
        .map(|()| buffer.len() - start_len)
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::AppendToBuffer))
}

/// Decodes a value from a JSON byte slice.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Encodes a wire message.
pub fn encode_message(message: &Message) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(message)
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeMessage))
}

/// Decodes a wire message.
pub fn decode_message(bytes: &[u8]) -> CodecResult<Message> {
    serde_json::from_slice(bytes)
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeMessage))
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::messages::{ActionMessage, PatchMessage};
    use crate::patch::{path, Patch};
    use crate::value::Value;
    use crate::{PlayerId, Tick};
    use std::collections::BTreeMap;

    #[test]
    fn test_encode_decode_roundtrip_message() {
        let original = Message::Action(ActionMessage {
            name: "move".to_owned(),
            input: Value::from(serde_json::json!({"dx": 5, "dy": 0})),
            player_id: PlayerId::from("p2"),
            tick: Some(Tick(4)),
            seq: Some(1),
            target_id: None,
        });
        let bytes = encode_message(&original).unwrap();
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_null_patch_value_survives_roundtrip() {
        let original = Message::Patch(PatchMessage {
            patch: vec![Patch::replace(path(["winner"]), Value::Null)],
            tick: Tick(9),
            acks: BTreeMap::new(),
        });
        let bytes = encode_message(&original).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains(r#""value":null"#));
        assert_eq!(decode_message(&bytes).unwrap(), original);
    }

    #[test]
    fn test_encode_append() {
        let mut buffer = Vec::new();
        let len1 = encode_append(&42u32, &mut buffer).unwrap();
        let len2 = encode_append(&"test", &mut buffer).unwrap();
        assert_eq!(buffer.len(), len1 + len2);
        assert_eq!(len1, 2);
    }

    #[test]
    fn test_decode_invalid_data() {
        let result = decode_message(b"{\"type\":");
        assert!(matches!(
            result,
            Err(CodecError::DecodeError {
                operation: CodecOperation::DecodeMessage,
                ..
            })
        ));
        let result: CodecResult<u64> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_map_keys_fail_to_encode() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1u8);
        let err = encode(&map).unwrap_err();
        assert!(matches!(err, CodecError::EncodeError { .. }));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::encode("test error", CodecOperation::Encode);
        assert!(err.to_string().contains("encoding failed"));

        let err = CodecError::decode("test error", CodecOperation::DecodeMessage);
        let msg = err.to_string();
        assert!(msg.contains("decoding failed"));
        assert!(msg.contains("network message"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut state = Value::object();
        state.insert("b", 2);
        state.insert("a", 1);
        let msg = Message::Patch(PatchMessage {
            patch: vec![Patch::full_state(&state)],
            tick: Tick(1),
            acks: BTreeMap::new(),
        });
        let bytes1 = encode_message(&msg).unwrap();
        let bytes2 = encode_message(&msg).unwrap();
        assert_eq!(bytes1, bytes2);
    }
}
