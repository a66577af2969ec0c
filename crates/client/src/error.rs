//! Client-side error types.

use parley_shared::EncodeError;
use thiserror::Error;

use crate::ws::Generation;

/// Rejected `connect` / rename input. Nothing changes state when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a WebSocket URL.")]
    EmptyUrl,
    #[error("Please enter a nickname.")]
    EmptyNickname,
    #[error("Invalid WebSocket URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure handing a frame to the socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no open socket for generation {0}")]
    NotOpen(Generation),
    #[error("socket writer has shut down")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Not connected to server. Please connect first.")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The session driver task is gone.
    #[error("session has been shut down")]
    Closed,
}
