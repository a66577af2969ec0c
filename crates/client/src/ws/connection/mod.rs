//! WebSocket transport seam and reconnect configuration.
//!
//! The session state machine never touches a socket directly. It drives a
//! [`Transport`] and receives [`SocketEvent`]s back, each tagged with the
//! [`Generation`] of the connection attempt that produced it so events from
//! a superseded socket can be discarded.

use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

/// Monotonic id of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Closed,
    /// A transport error was reported; a close always follows.
    Errored,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a socket is (or may soon be) live.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Status text shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Not connected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Closed => "Disconnected",
            ConnectionState::Errored => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configuration for auto-reconnect behavior
///
/// The defaults retry every 5 seconds forever. Raising `backoff_multiplier`
/// above 1.0 or setting `max_attempts` turns this into a bounded backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub interval: Duration,
    /// Multiplier applied per attempt (1.0 = fixed interval)
    pub backoff_multiplier: f32,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(5000),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self
            .interval
            .mul_f64(f64::from(self.backoff_multiplier.max(1.0)).powi(exponent).min(1.0e6));
        delay.min(self.max_delay.max(self.interval))
    }

    /// Whether `attempts` retries have used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// What happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEventKind {
    Opened,
    /// One complete frame. Text frames arrive as their UTF-8 bytes.
    Frame(Vec<u8>),
    /// An error was reported; `Closed` follows.
    Error(String),
    Closed { clean: bool },
}

/// A socket callback, tagged with the attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub generation: Generation,
    pub kind: SocketEventKind,
}

impl SocketEvent {
    pub fn new(generation: Generation, kind: SocketEventKind) -> Self {
        Self { generation, kind }
    }
}

/// The socket side of a session.
///
/// Implementations report progress by delivering [`SocketEvent`]s to the
/// driver. `open` never blocks; the outcome arrives as `Opened` or
/// `Error` + `Closed`.
pub trait Transport {
    /// Start opening a socket for `generation`.
    fn open(&mut self, generation: Generation, url: &str);

    /// Queue one text frame on the socket for `generation`.
    fn send(&mut self, generation: Generation, frame: String) -> Result<(), TransportError>;

    /// Close the socket for `generation`. Unknown generations are ignored.
    fn close(&mut self, generation: Generation);
}

mod connection_native;

pub use connection_native::WsTransport;
