//! Errors produced by the codec and parser.

use thiserror::Error;

/// Error for encoding/decoding a single [`crate::packet::Packet`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// `set_command` was called with more parameters than
    /// [`crate::packet::MAX_PARAMETERS`].
    #[error("too many parameters: {got} > {max}")]
    TooManyParameters { got: usize, max: usize },
    /// The buffer handed to a decode routine was too short to contain a
    /// well-formed frame.
    #[error("buffer too short to decode a frame")]
    BufferTooShort,
    /// The 2-byte header sentinel did not match `0xEF 0x01`.
    #[error("bad header sentinel")]
    BadHeader,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
