//! Wire protocol: the message envelope, reserved message types, and the
//! lifecycle event names the client emits locally.
//!
//! Everything exchanged with the server is an [`Envelope`] serialized as
//! JSON text over the transport. The envelope's `data` field is an opaque
//! [`serde_json::Value`]; typed wrappers built on top of the client attach
//! per-domain schemas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unit of data sent and received over the connection.
///
/// `id` is generated client-side and can be used by callers to correlate
/// request/response pairs. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type. Reserved values (see [`reserved`]) are handled inside
    /// the client; everything else is a domain event.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Client-generated correlation id.
    pub id: String,
    /// Creation time, RFC 3339 on the wire.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Construct an envelope with a fresh v4 id and the current time.
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Reply for a ping, echoing its id so the other side can correlate.
    pub fn pong_for(ping: &Envelope) -> Self {
        Self {
            kind: reserved::PONG.into(),
            data: ping.data.clone(),
            id: ping.id.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this message type is handled inside the client rather than
    /// forwarded to domain subscribers.
    pub fn is_reserved(&self) -> bool {
        reserved::ALL.contains(&self.kind.as_str())
    }
}

/// Payload of the `auth` handshake message sent immediately after the
/// transport opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

impl AuthRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Wrap the request into its wire envelope: `{type: "auth", data: {token}}`.
    pub fn into_envelope(self) -> Envelope {
        Envelope::new(
            reserved::AUTH,
            serde_json::json!({ "token": self.token }),
        )
    }
}

/// Message types handled internally by the client. They are never forwarded
/// to generic subscribers; `error` surfaces through the
/// [`lifecycle::SERVER_ERROR`] event instead.
pub mod reserved {
    pub const AUTH: &str = "auth";
    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const AUTH_FAILED: &str = "auth_failed";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";

    pub const ALL: [&str; 6] = [AUTH, AUTH_SUCCESS, AUTH_FAILED, PING, PONG, ERROR];
}

/// Event names emitted locally by the client on state transitions so
/// consumers can reflect connectivity without polling.
pub mod lifecycle {
    /// Transport opened.
    pub const CONNECT: &str = "connect";
    /// Connection went away, explicitly or not.
    pub const DISCONNECT: &str = "disconnect";
    /// Authentication accepted; the connection is ready.
    pub const AUTHENTICATED: &str = "authenticated";
    /// Authentication rejected; no automatic reconnect follows.
    pub const AUTH_FAILED: &str = "auth_failed";
    /// A reconnect attempt has been scheduled; data carries
    /// `{attempt, delay_ms}`.
    pub const RECONNECTING: &str = "reconnecting";
    /// Server-reported `error` envelope, forwarded with its payload.
    pub const SERVER_ERROR: &str = "server_error";
    /// The outbound queue evicted its oldest entry; data carries the
    /// dropped envelope's id and type.
    pub const QUEUE_OVERFLOW: &str = "queue_overflow";
    /// Reconnection gave up; an explicit `connect()` is required to resume.
    pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";
}
