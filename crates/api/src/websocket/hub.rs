//! Connection registry and conversation fan-out
//!
//! Staff connections are indexed by tenant, customer connections by customer
//! id. A conversation fans out to every staff connection of its tenant plus
//! every connection of its customer, if it has one.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use super::connection::{Client, EnqueueError};
use super::events::ServerEvent;

#[derive(Default)]
struct Registry {
    /// tenant_id -> staff connections
    staff: HashMap<Uuid, Vec<Arc<Client>>>,
    /// customer_id -> customer connections
    customers: HashMap<Uuid, Vec<Arc<Client>>>,
}

impl Registry {
    /// The index and key a client lives under
    fn bucket_mut(&mut self, client: &Client) -> (&mut HashMap<Uuid, Vec<Arc<Client>>>, Uuid) {
        match client.customer_id() {
            Some(customer_id) => (&mut self.customers, customer_id),
            None => (&mut self.staff, client.tenant_id()),
        }
    }

    fn is_empty(&self) -> bool {
        self.staff.is_empty() && self.customers.is_empty()
    }
}

/// In-memory connection registry, constructed once at startup and shared
#[derive(Default)]
pub struct Hub {
    registry: RwLock<Registry>,
    /// Signalled whenever the last connection leaves
    emptied: Notify,
}

/// Outcome of a fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Statistics about registered connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub staff_connections: usize,
    pub customer_connections: usize,
    pub tenants: usize,
    pub customers: usize,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its identity key
    pub async fn register(&self, client: Arc<Client>) {
        let mut registry = self.registry.write().await;
        let (index, key) = registry.bucket_mut(&client);
        let bucket = index.entry(key).or_default();
        bucket.push(Arc::clone(&client));

        tracing::info!(
            session_id = %client.session_id,
            tenant_id = %client.tenant_id(),
            sender_type = %client.identity.sender_kind(),
            bucket_size = bucket.len(),
            "Chat connection registered"
        );
    }

    /// Remove a connection; a no-op if it is not registered
    pub async fn unregister(&self, client: &Client) {
        let mut registry = self.registry.write().await;
        let (index, key) = registry.bucket_mut(client);
        let Some(bucket) = index.get_mut(&key) else {
            return;
        };

        let before = bucket.len();
        bucket.retain(|c| c.session_id != client.session_id);
        let removed = bucket.len() < before;

        if bucket.is_empty() {
            index.remove(&key);
        }
        if registry.is_empty() {
            self.emptied.notify_waiters();
        }

        if removed {
            tracing::info!(
                session_id = %client.session_id,
                tenant_id = %client.tenant_id(),
                sender_type = %client.identity.sender_kind(),
                "Chat connection unregistered"
            );
        }
    }

    /// Deliver an event to a conversation's participants
    ///
    /// Every staff connection of `tenant_id` receives it, and, when
    /// `customer_id` is set, every connection of that customer. Enqueueing
    /// never waits: a recipient whose queue is full misses this frame.
    pub async fn broadcast_to_conversation(
        &self,
        tenant_id: Uuid,
        customer_id: Option<Uuid>,
        event: &ServerEvent,
    ) -> BroadcastReport {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = ?e, event_type = event.kind(), "Failed to serialize broadcast event");
                return BroadcastReport::default();
            }
        };

        let registry = self.registry.read().await;
        let staff = registry.staff.get(&tenant_id).into_iter().flatten();
        let customers = customer_id
            .and_then(|id| registry.customers.get(&id))
            .into_iter()
            .flatten();

        let mut report = BroadcastReport::default();
        for client in staff.chain(customers) {
            match client.enqueue(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(EnqueueError::Full) => {
                    report.dropped += 1;
                    tracing::debug!(
                        session_id = %client.session_id,
                        event_type = event.kind(),
                        "Outbound queue full, dropping frame"
                    );
                }
                Err(e) => {
                    report.dropped += 1;
                    tracing::debug!(
                        session_id = %client.session_id,
                        error = %e,
                        "Failed to enqueue frame (likely closing)"
                    );
                }
            }
        }

        tracing::debug!(
            tenant_id = %tenant_id,
            customer_id = ?customer_id,
            event_type = event.kind(),
            recipients = report.delivered,
            dropped = report.dropped,
            "Broadcast event to conversation"
        );

        report
    }

    /// Close the outbound queue of every registered connection
    ///
    /// Each outbound pump then writes a close frame and its connection
    /// unregisters itself. Returns how many connections were signalled.
    pub async fn close_all(&self) -> usize {
        let registry = self.registry.read().await;
        let clients: Vec<&Arc<Client>> = registry
            .staff
            .values()
            .chain(registry.customers.values())
            .flatten()
            .collect();

        for client in &clients {
            client.close_outbound();
        }

        tracing::info!(connections = clients.len(), "Closing all chat connections");
        clients.len()
    }

    /// Wait until no connection is registered, or `timeout` elapses
    ///
    /// Returns `true` if the hub drained in time.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.emptied.notified();
                if self.registry.read().await.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Number of staff connections registered for a tenant
    pub async fn staff_count(&self, tenant_id: &Uuid) -> usize {
        let registry = self.registry.read().await;
        registry.staff.get(tenant_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of connections registered for a customer
    pub async fn customer_count(&self, customer_id: &Uuid) -> usize {
        let registry = self.registry.read().await;
        registry.customers.get(customer_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn stats(&self) -> HubStats {
        let registry = self.registry.read().await;
        HubStats {
            staff_connections: registry.staff.values().map(Vec::len).sum(),
            customer_connections: registry.customers.values().map(Vec::len).sum(),
            tenants: registry.staff.len(),
            customers: registry.customers.len(),
        }
    }
}
