//! Codec error types.

use thiserror::Error;

/// A frame that could not be turned into text.
///
/// Malformed JSON is not an error at this level; see
/// [`crate::protocol::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
}

/// An intent that failed to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to encode {kind} frame: {reason}")]
pub struct EncodeError {
    pub kind: &'static str,
    pub reason: String,
}
