//! A pooled connection

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::ConnectionKey;
use crate::error::{ConnectError, ConnectResult, SessionResult};
use crate::transport::{RemoteSession, SshTransport};

/// One authenticated transport owned by the pool
///
/// Handles are shared: several callers may open sessions on the same
/// connection at once. Callers never return a connection; they close their
/// sessions and drop the `Arc`.
pub struct RemoteConnection {
    id: Uuid,
    key: ConnectionKey,
    transport: Arc<dyn SshTransport>,
    created_at: Instant,
    /// Milliseconds after `created_at`
    last_used_ms: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("idle", &self.idle_for())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RemoteConnection {
    pub(crate) fn new(key: ConnectionKey, transport: Arc<dyn SshTransport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            transport,
            created_at: Instant::now(),
            last_used_ms: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Connection identifier
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Pool key
    pub const fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Underlying transport
    pub fn transport(&self) -> &Arc<dyn SshTransport> {
        &self.transport
    }

    /// Marks the connection as used now
    pub fn touch(&self) {
        let elapsed = Instant::now().duration_since(self.created_at).as_millis();
        self.last_used_ms
            .fetch_max(u64::try_from(elapsed).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Last time the connection was handed out or used for a session
    pub fn last_used(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed))
    }

    /// Time since last use
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_used())
    }

    /// Whether the pool closed this connection
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Opens a logical session and refreshes the last-used time
    ///
    /// # Errors
    ///
    /// Returns a session error when the transport refuses a new channel.
    pub async fn open_session(&self) -> SessionResult<Arc<dyn RemoteSession>> {
        self.touch();
        self.transport.open_session().await
    }

    /// Sends a health probe; does not refresh the last-used time
    ///
    /// # Errors
    ///
    /// Returns an error when the connection was closed or does not answer.
    pub async fn probe(&self) -> ConnectResult<()> {
        if self.is_closed() {
            return Err(ConnectError::Transport(format!("{} is closed", self.key)));
        }
        self.transport.probe().await
    }

    /// Closes the transport; later calls are no-ops
    pub(crate) async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.transport.close().await;
        true
    }
}
