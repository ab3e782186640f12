//! Frames exchanged with the relay.
//!
//! A [`Frame`] is either a structured JSON value (carried as a text
//! message) or a raw byte payload (carried as a binary message). The same
//! type is used for outgoing commands and decoded incoming messages.
//!
//! | Class | Wire message | Decoded as |
//! |-------|--------------|------------|
//! | [`FrameClass::Text`] | text | `serde_json::Value` |
//! | [`FrameClass::Binary`] | binary | `Vec<u8>` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::{Value, from_str, to_string, to_value};

use crate::error::{Error, Result};
use crate::transport::WireFrame;

// ============================================================================
// FrameClass
// ============================================================================

/// Response class a matcher listens for.
///
/// Text and binary frames are addressed independently: a matcher only ever
/// sees frames of its own class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameClass {
    /// Structured JSON messages.
    #[default]
    Text,
    /// Raw byte payloads.
    Binary,
}

impl fmt::Display for FrameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Which way a frame travelled, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Written to the relay.
    Sent,
    /// Delivered by the relay.
    Received,
}

// ============================================================================
// Frame
// ============================================================================

/// One message sent to or received from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Structured message, JSON-encoded on the wire.
    Text(Value),
    /// Raw binary payload.
    Binary(Vec<u8>),
}

impl Frame {
    /// Serializes `value` into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Text(to_value(value)?))
    }

    /// Returns the class of this frame.
    #[inline]
    #[must_use]
    pub fn class(&self) -> FrameClass {
        match self {
            Self::Text(_) => FrameClass::Text,
            Self::Binary(_) => FrameClass::Binary,
        }
    }

    /// Returns the structured value of a text frame.
    #[inline]
    #[must_use]
    pub fn text(&self) -> Option<&Value> {
        match self {
            Self::Text(value) => Some(value),
            Self::Binary(_) => None,
        }
    }

    /// Returns the payload of a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            Self::Text(_) => None,
        }
    }

    /// Returns element `index` of a text frame holding a JSON array.
    ///
    /// Relay messages are arrays such as `["OK", id, true, ""]`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.text().and_then(|value| value.get(index))
    }

    /// Returns element `index` as a string slice.
    #[inline]
    #[must_use]
    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// Returns the payload size in bytes for binary frames, 0 otherwise.
    #[inline]
    #[must_use]
    pub fn binary_len(&self) -> usize {
        self.binary().map_or(0, <[u8]>::len)
    }

    /// Decodes a frame received from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a text message is not valid JSON.
    pub fn decode(wire: WireFrame) -> Result<Self> {
        match wire {
            WireFrame::Text(text) => from_str(&text)
                .map(Self::Text)
                .map_err(|e| Error::protocol(format!("undecodable text frame: {e}"))),
            WireFrame::Binary(bytes) => Ok(Self::Binary(bytes)),
        }
    }

    /// Encodes the frame for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value cannot be serialized.
    pub fn encode(&self) -> Result<WireFrame> {
        match self {
            Self::Text(value) => Ok(WireFrame::Text(to_string(value)?)),
            Self::Binary(bytes) => Ok(WireFrame::Binary(bytes.clone())),
        }
    }
}

impl From<Value> for Frame {
    fn from(value: Value) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Frame {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value}"),
            Self::Binary(bytes) => write!(f, "<binary message> {}", bytes.len()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
