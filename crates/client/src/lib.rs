//! `pulse-client` — resilient real-time messaging client.
//!
//! Maintains a single persistent WebSocket connection to a server,
//! authenticates on every attempt, detects silently-dead connections via
//! heartbeats, queues outbound messages during outages, reconnects with
//! bounded exponential back-off, and dispatches typed inbound events to
//! subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your application                                         │
//! │                                                           │
//! │   let client = Client::builder()                          │
//! │       .endpoint("wss://rt.example.com/ws")                │
//! │       .token(token)                                       │
//! │       .build()?;                                          │
//! │                                                           │
//! │   client.on("job.progress", |env| { .. }).await?;         │
//! │   client.connect().await?;                                │
//! │   let id = client.send("job.start", args).await?;         │
//! └───────────────────────┬───────────────────────────────────┘
//!                         │ command channel
//! ┌───────────────────────▼───────────────────────────────────┐
//! │  Driver task (sole owner of all mutable state)            │
//! │    state machine · message queue · event dispatcher       │
//! │    heartbeat monitor · reconnect policy · statistics      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. `connect()` → open the WebSocket
//! 2. Send `{type: "auth", data: {token}}`, wait for `auth_success`
//! 3. Ready: flush queued messages oldest-first, start heartbeats
//! 4. Inbound envelopes are dispatched to subscribers in arrival order
//! 5. On involuntary loss: reconnect with bounded exponential back-off;
//!    `disconnect()` suppresses reconnection until the next `connect()`
//!
//! All state lives in a single driver task, so callbacks and timers are
//! strictly ordered and nothing needs a lock. The [`Client`] handle is a
//! thin, cloneable front over the driver's command channel.

pub mod builder;
pub mod client;
pub mod dispatch;
pub mod heartbeat;
pub mod queue;
pub mod reconnect;
pub mod types;

mod conn;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ClientBuilder;
pub use client::{Client, Subscription};
pub use dispatch::{EventCallback, EventDispatcher, SubscriptionId};
pub use heartbeat::HeartbeatMonitor;
pub use queue::MessageQueue;
pub use reconnect::ReconnectPolicy;
pub use types::{ClientError, ConnectionState, Stats, Status};

// Re-export the protocol so consumers never need to import it directly.
pub use pulse_protocol::{lifecycle, reserved, AuthRequest, Envelope};
