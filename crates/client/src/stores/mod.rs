//! Session-owned collections projected to subscribers.

pub mod presence;

pub use presence::{ParticipantRoster, TypingSet};
