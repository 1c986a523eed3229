//! Core types: connection state, statistics, and the client error taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle state of the connection.
///
/// A single authoritative value owned by the driver task. `Ready` is the
/// only state in which sends go directly to the transport; in every other
/// state they are queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    /// Explicit caller-initiated teardown; suppresses reconnection.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Connection statistics. Read-only to consumers; mutated only by the
/// driver task.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// When the current session reached ready, if connected.
    pub connected_since: Option<DateTime<Utc>>,
    /// Envelopes delivered to the transport.
    pub sent: u64,
    /// Valid envelopes received.
    pub received: u64,
    /// Involuntary losses of a ready connection.
    pub reconnect_count: u64,
    /// Most recent transport or session error.
    pub last_error: Option<String>,
}

/// Snapshot returned by [`Client::status`](crate::Client::status).
#[derive(Debug, Clone)]
pub struct Status {
    pub state: ConnectionState,
    pub stats: Stats,
    pub queue_len: usize,
}

/// Top-level client error.
///
/// Transient transport failures, malformed envelopes, and queue pressure
/// are handled internally and observable only through lifecycle events;
/// they never surface here.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("authentication rejected by server")]
    AuthRejected,
    /// The driver task is gone; the client was shut down.
    #[error("client closed")]
    Closed,
}
