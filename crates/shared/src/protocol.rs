//! Chat wire protocol: JSON text frames with a `type` discriminator.
//!
//! Outbound frames are produced from [`OutboundIntent`] by [`encode`]; inbound
//! frames are turned into [`InboundEvent`] by [`decode`] / [`decode_text`].
//! Decoding never fails on malformed JSON or unknown frame types, those are
//! surfaced as [`InboundEvent::Unrecognized`] so the raw payload can still be
//! displayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::mentions::extract_mentions;

/// A locally originated action, encoded immediately into one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundIntent {
    SetNickname {
        nickname: String,
    },
    Chat {
        content: String,
        /// `@name` references found in `content`, in order of appearance.
        mentions: Vec<String>,
    },
    TypingStart,
    TypingStop,
}

impl OutboundIntent {
    pub fn set_nickname(nickname: impl Into<String>) -> Self {
        Self::SetNickname {
            nickname: nickname.into(),
        }
    }

    /// Build a chat intent, extracting mentions from the text.
    pub fn chat(content: impl Into<String>) -> Self {
        let content = content.into();
        let mentions = extract_mentions(&content);
        Self::Chat { content, mentions }
    }

    /// Wire name of this intent's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetNickname { .. } => "set_nickname",
            Self::Chat { .. } => "chat",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
        }
    }
}

/// A chat line relayed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl ChatMessage {
    /// Whether `nickname` is referenced by this message.
    pub fn mentions(&self, nickname: &str) -> bool {
        self.mentions.iter().any(|m| m == nickname)
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_deref())
    }
}

/// A server-generated notice (joins, leaves, welcome lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl SystemNotice {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_deref())
    }

    /// Nickname confirmed by a server welcome line (`환영합니다, <name>님!`).
    pub fn welcome_nickname(&self) -> Option<&str> {
        let rest = self.content.strip_prefix("환영합니다,")?;
        let (name, _) = rest.split_once("님!")?;
        let name = name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Chat(ChatMessage),
    System(SystemNotice),
    UserList {
        users: Vec<String>,
    },
    UserTyping {
        nickname: String,
    },
    UserStoppedTyping {
        nickname: String,
    },
    /// Non-JSON payloads and frames with an unknown or malformed shape.
    #[serde(skip)]
    Unrecognized {
        raw: String,
    },
}

/// Encode an intent as one UTF-8 JSON frame.
pub fn encode(intent: &OutboundIntent) -> Result<String, EncodeError> {
    serde_json::to_string(intent).map_err(|e| EncodeError {
        kind: intent.kind(),
        reason: e.to_string(),
    })
}

/// Decode a raw frame. Only invalid UTF-8 is an error; everything else
/// degrades to [`InboundEvent::Unrecognized`].
pub fn decode(bytes: &[u8]) -> Result<InboundEvent, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;
    Ok(decode_text(text))
}

/// Decode a text frame.
pub fn decode_text(text: &str) -> InboundEvent {
    serde_json::from_str::<InboundEvent>(text).unwrap_or_else(|_| InboundEvent::Unrecognized {
        raw: text.to_string(),
    })
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
