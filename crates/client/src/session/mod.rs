//! The chat session core: state machine, typing debounce and reconnect policy.

pub mod events;
pub mod machine;
pub mod reconnect;
pub mod typing;

pub use events::{Notice, SessionEvent, SessionSnapshot};
pub use machine::{normalize_ws_url, ConnectTarget, SessionMachine};
pub use reconnect::ReconnectPolicy;
pub use typing::TypingDebouncer;
