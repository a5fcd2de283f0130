//! WebSocket connection state
//!
//! A [`Client`] is the identity of one live socket plus the producer side of
//! its bounded outbound queue. Any task may enqueue; only the connection's
//! outbound pump drains.

use pharmchat_shared::ClientIdentity;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::events::ServerEvent;

/// Per-connection timing and sizing limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpSettings {
    /// Bound on any single socket write
    pub write_wait: Duration,
    /// Silence allowed between liveness responses before the peer is dropped
    pub pong_wait: Duration,
    /// Liveness probe cadence, 9/10 of `pong_wait`
    pub ping_period: Duration,
    pub max_message_bytes: usize,
    pub outbound_capacity: usize,
}

impl PumpSettings {
    pub fn new(
        write_wait: Duration,
        pong_wait: Duration,
        max_message_bytes: usize,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_bytes,
            outbound_capacity: outbound_capacity.max(1),
        }
    }
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60), 8192, 256)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Represents an active chat connection
#[derive(Debug)]
pub struct Client {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Authenticated routing identity
    pub identity: ClientIdentity,

    /// `None` once the queue has been closed
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Client {
    pub fn new(identity: ClientIdentity, outbound: mpsc::Sender<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity,
            outbound: Mutex::new(Some(outbound)),
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.identity.tenant_id()
    }

    pub fn staff_id(&self) -> Option<Uuid> {
        self.identity.staff_id()
    }

    pub fn customer_id(&self) -> Option<Uuid> {
        self.identity.customer_id()
    }

    /// Queue a serialized frame without waiting
    ///
    /// A full queue rejects the new frame; frames already queued are kept.
    pub fn enqueue(&self, frame: String) -> Result<(), EnqueueError> {
        let guard = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(EnqueueError::Closed)?;
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Encode and queue an event for this connection only
    pub fn send_event(&self, event: &ServerEvent) -> Result<(), EnqueueError> {
        self.enqueue(event.encode()?)
    }

    /// Close the outbound queue
    ///
    /// The outbound pump drains what is already queued, then writes a close
    /// frame and exits. Idempotent.
    pub fn close_outbound(&self) {
        let mut guard = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            tracing::debug!(session_id = %self.session_id, "Outbound queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}
