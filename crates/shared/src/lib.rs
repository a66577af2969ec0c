//! Shared wire types and utilities for the parley chat client.

pub mod error;
pub mod mentions;
pub mod protocol;

pub use error::*;
pub use mentions::*;
pub use protocol::*;
