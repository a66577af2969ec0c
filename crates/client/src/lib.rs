//! Parley client - session engine for a WebSocket chat room.
//!
//! This crate owns the single connection to a chat server, tracks who is
//! present and who is typing, and hands parsed events to whatever renders
//! them. The terminal client in `main.rs` is one such renderer.

pub mod compose;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod stores;
pub mod ws;

pub use config::SessionConfig;
pub use error::{SessionError, TransportError, ValidationError};
pub use session::{Notice, SessionEvent, SessionSnapshot};
pub use storage::{FileStore, MemoryStore, Preferences, Theme};
pub use ws::{ChatClient, ConnectionState};
