//! Registry of live connections.
//!
//! The registry hands out connection IDs and keeps a read-only view of every
//! live connection for status reporting and the connection limit. Workers
//! never look at each other's entries.

use super::{ConnectionContext, ConnectionId};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Central registry of client connections.
///
/// # Architecture
///
/// * Uses `DashMap` so registration and removal never block each other
/// * Implements atomic connection ID generation
/// * Entries are removed by a [`RegistrationGuard`] when the worker ends
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Map of connection ID to connection metadata
    connections: DashMap<ConnectionId, Arc<ConnectionContext>>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers a new connection.
    ///
    /// # Arguments
    ///
    /// * `registry` - The shared registry
    /// * `remote_addr` - The network address of the connecting client
    ///
    /// # Returns
    ///
    /// The connection's context and a guard that unregisters it on drop.
    pub fn register(
        registry: &Arc<Self>,
        remote_addr: SocketAddr,
    ) -> (Arc<ConnectionContext>, RegistrationGuard) {
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        let context = Arc::new(ConnectionContext::new(id, remote_addr));
        registry.connections.insert(id, context.clone());
        trace!("🔗 Registered connection {} from {}", id, remote_addr);

        let guard = RegistrationGuard {
            registry: registry.clone(),
            id,
        };
        (context, guard)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionContext>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Status summaries of all live connections, ordered by connection ID.
    pub fn summaries(&self) -> Vec<String> {
        let mut contexts: Vec<Arc<ConnectionContext>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        contexts.sort_by_key(|context| context.id());
        contexts.iter().map(|context| context.summary()).collect()
    }

    fn remove(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            trace!("🔌 Unregistered connection {}", id);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a connection from the registry when dropped, including when the
/// worker unwinds.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
