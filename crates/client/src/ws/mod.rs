//! WebSocket module for the real-time chat session.
//!
//! This module provides:
//! - The [`Transport`] seam and its tokio-tungstenite implementation
//! - Generation-tagged socket events, so late callbacks from a replaced
//!   socket are ignored
//! - [`ChatClient`], the handle the UI talks to
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────────────┐
//! │  ChatClient  │────────────▶│         driver task          │
//! │  (cloneable) │◀────────────│  ┌────────────────────────┐  │
//! └──────────────┘  events /   │  │     SessionMachine     │  │
//!                   snapshot   │  └────────────────────────┘  │
//!                              └──────────────────────────────┘
//!                                   │ open/send/close   ▲
//!                                   ▼                   │ SocketEvent { generation, .. }
//!                              ┌──────────────────────────────┐
//!                              │   WsTransport (one socket    │
//!                              │   task per generation)       │
//!                              └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = ChatClient::spawn(SessionConfig::from_env(), None);
//! let mut events = client.subscribe();
//!
//! client.connect("http://localhost:8765", "Alice").await?;
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::StateChanged { state: ConnectionState::Connected } = event {
//!         client.send_chat("hello @Bob").await?;
//!     }
//! }
//! ```

mod connection;
mod manager;

pub use connection::{
    ConnectionState, Generation, ReconnectConfig, SocketEvent, SocketEventKind, Transport,
    WsTransport,
};

pub use manager::ChatClient;

#[cfg(test)]
pub(crate) use connection::testing;
