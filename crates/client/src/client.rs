//! Public client handle.
//!
//! A [`Client`] is a thin, cloneable front over the driver task's command
//! channel. Construction is explicit — the hosting application owns the
//! lifecycle and decides when to `connect()` and `disconnect()` — and
//! every method is safe to call from any task.

use std::sync::Arc;

use pulse_protocol::Envelope;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::conn::Command;
use crate::dispatch::SubscriptionId;
use crate::types::{ClientError, Status};

/// Handle to a running messaging client.
///
/// Create via [`Client::builder`](crate::ClientBuilder). Cloning the handle
/// shares the same underlying connection.
#[derive(Clone, Debug)]
pub struct Client {
    cmd_tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
}

impl Client {
    /// Start a new builder.
    pub fn builder() -> crate::builder::ClientBuilder {
        crate::builder::ClientBuilder::new()
    }

    pub(crate) fn new(cmd_tx: mpsc::Sender<Command>, shutdown: CancellationToken) -> Self {
        Self { cmd_tx, shutdown }
    }

    /// Begin connecting. Idempotent: a no-op while already connecting or
    /// connected. Also restarts a client that gave up after exhausting its
    /// reconnect attempts.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.command(Command::Connect).await
    }

    /// Tear the connection down and suppress reconnection until the next
    /// [`connect`](Self::connect). Cancels any pending reconnect timer and
    /// stops the heartbeat in the same driver tick.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect).await
    }

    /// Send a message. Always accepted from the caller's point of view:
    /// delivered straight to the transport when the connection is ready,
    /// queued otherwise. Returns the envelope id for correlation.
    pub async fn send(
        &self,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<String, ClientError> {
        let envelope = Envelope::new(kind, data);
        let id = envelope.id.clone();
        self.command(Command::Send(envelope)).await?;
        Ok(id)
    }

    /// Subscribe to an event type: server-pushed domain events by name, or
    /// the client's own [`lifecycle`](crate::lifecycle) events. Callbacks
    /// run on the driver task in registration order; keep them brief.
    pub async fn on(
        &self,
        kind: impl Into<String>,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Result<Subscription, ClientError> {
        let kind = kind.into();
        let (reply, rx) = oneshot::channel();
        self.command(Command::Subscribe {
            kind: kind.clone(),
            callback: Arc::new(callback),
            reply,
        })
        .await?;
        let id = rx.await.map_err(|_| ClientError::Closed)?;
        Ok(Subscription {
            kind,
            id,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Remove a subscription by id. Removing one that no longer exists is
    /// a no-op.
    pub async fn off(&self, kind: impl Into<String>, id: SubscriptionId) -> Result<(), ClientError> {
        self.command(Command::Unsubscribe {
            kind: kind.into(),
            id,
        })
        .await
    }

    /// Snapshot of the connection state, statistics, and queue length.
    pub async fn status(&self) -> Result<Status, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Status { reply }).await?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Stop the driver task entirely. For application teardown; a stopped
    /// client cannot be reconnected.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn command(&self, cmd: Command) -> Result<(), ClientError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Closed)
    }
}

/// An active event registration returned by [`Client::on`].
pub struct Subscription {
    kind: String,
    id: SubscriptionId,
    cmd_tx: mpsc::Sender<Command>,
}

impl Subscription {
    /// The event type this subscription listens to.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove this registration.
    pub async fn unsubscribe(self) -> Result<(), ClientError> {
        self.cmd_tx
            .send(Command::Unsubscribe {
                kind: self.kind,
                id: self.id,
            })
            .await
            .map_err(|_| ClientError::Closed)
    }
}
