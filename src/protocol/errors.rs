//! Protocol error types for layout construction, payload decoding and registration.

use thiserror::Error;

use super::registry::PacketId;

/// Errors raised while building a [`Layout`](super::Layout) from type codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The type code is not one of `b B h H i I q Q`.
    #[error("unknown layout type code {0:?}")]
    UnknownTypeCode(char),
}

/// Malformed or truncated payload.
///
/// Reads never run past the end of a payload; they fail with one of these instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes remain than the read requires.
    #[error("payload truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A string field ran to the end of the payload without a zero byte.
    #[error("string starting at offset {offset} has no terminator")]
    Unterminated { offset: usize },

    /// A string field is not valid UTF-8.
    #[error("string starting at offset {offset} is not valid UTF-8")]
    InvalidText { offset: usize },

    /// A fixed-arity unpack was asked for a different number of fields than the layout has.
    #[error("layout has {actual} fields, caller expected {expected}")]
    Arity { expected: usize, actual: usize },

    /// A game date does not map to a representable calendar date.
    #[error("game date {0} is out of the calendar range")]
    DateOutOfRange(u64),
}

/// Packet registration failure. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two packet types declared the same identifier.
    #[error("packet id {id} already registered to {existing}, cannot register {incoming}")]
    Conflict {
        id: PacketId,
        existing: &'static str,
        incoming: &'static str,
    },
}

/// Result type for payload decoding
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
