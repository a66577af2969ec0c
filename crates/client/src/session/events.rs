//! What the session tells its subscribers.

use std::fmt;

use parley_shared::{ChatMessage, SystemNotice};

use crate::error::{SessionError, ValidationError};
use crate::ws::{ConnectionState, Generation};

/// A local status line for the UI, not sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected { url: String },
    Disconnected,
    TransportError { reason: String },
    Validation(ValidationError),
    NotConnected,
    NicknameChanged { nickname: String },
    /// Renamed while offline; the server has not been told.
    NicknameLocalOnly { nickname: String },
    NicknameUsage,
}

impl Notice {
    /// Whether this should be styled as a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notice::TransportError { .. } | Notice::Validation(_) | Notice::NotConnected
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connected { url } => write!(f, "Connected to {url}"),
            Notice::Disconnected => f.write_str("Disconnected from server."),
            Notice::TransportError { reason } => {
                write!(f, "WebSocket error occurred: {reason}")
            }
            Notice::Validation(e) => write!(f, "{e}"),
            Notice::NotConnected => write!(f, "{}", SessionError::NotConnected),
            Notice::NicknameChanged { nickname } => {
                write!(f, "Nickname changed to {nickname}.")
            }
            Notice::NicknameLocalOnly { nickname } => write!(
                f,
                "Nickname changed locally to {nickname}, but not connected to the server."
            ),
            Notice::NicknameUsage => {
                f.write_str("Enter a nickname to use, e.g. /nick NewNickname")
            }
        }
    }
}

/// Emitted by the session after each input it handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        state: ConnectionState,
    },
    IdentityChanged {
        nickname: String,
    },
    Chat {
        message: ChatMessage,
        /// Sent under the local nickname.
        own: bool,
    },
    System(SystemNotice),
    /// A frame that could not be understood, shown verbatim.
    Unrecognized {
        raw: String,
    },
    RosterChanged {
        users: Vec<String>,
    },
    TypingChanged {
        typing: Vec<String>,
    },
    /// The local user was mentioned while the window was unfocused.
    NotificationRequested {
        sender: String,
        content: String,
    },
    Notice(Notice),
}

/// Read-only projection of session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub generation: Generation,
    pub nickname: Option<String>,
    pub roster: Vec<String>,
    pub typing: Vec<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            generation: Generation::default(),
            nickname: None,
            roster: Vec::new(),
            typing: Vec::new(),
        }
    }
}
