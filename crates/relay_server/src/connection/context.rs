//! Per-connection metadata.
//!
//! This module defines what is known about a single client connection over
//! its lifetime: who it is, when it arrived, when it last sent something and
//! which target it is relayed to.

use super::ConnectionId;
use crate::auth::TargetSpec;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Represents an individual client connection to the server.
///
/// The endpoints themselves are owned by the connection worker; this struct
/// only carries metadata so it can be shared with the
/// [`ConnectionRegistry`](super::ConnectionRegistry) for status reporting.
///
/// # Fields
///
/// * `id` - Identifier used in all log lines about the connection
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - When the connection was accepted
/// * `last_activity_ms` - Milliseconds after `connected_at` of the last client input
/// * `target` - The relay target, set once authorization succeeded
#[derive(Debug)]
pub struct ConnectionContext {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: Instant,
    last_activity_ms: AtomicU64,
    target: OnceLock<TargetSpec>,
}

impl ConnectionContext {
    /// Creates the context for a freshly accepted connection.
    pub fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            target: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Time since the connection was accepted.
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Time since the client last sent data.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.connected_for().saturating_sub(last)
    }

    /// Records client activity.
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.connected_for().as_millis()).unwrap_or(u64::MAX);
        self.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Records the authorized relay target. Only the first call has an effect.
    pub fn set_target(&self, target: TargetSpec) {
        let _ = self.target.set(target);
    }

    pub fn target(&self) -> Option<&TargetSpec> {
        self.target.get()
    }

    /// One-line status summary, e.g.
    /// `[7] 203.0.113.9 -> bbs.example.com:23 (connected: 12.5min, idle: 40sec)`.
    pub fn summary(&self) -> String {
        let target = self
            .target()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no target yet".to_string());
        format!(
            "[{}] {} -> {} (connected: {:.1}min, idle: {}sec)",
            self.id,
            self.remote_addr.ip(),
            target,
            self.connected_for().as_secs_f64() / 60.0,
            self.idle_for().as_secs()
        )
    }
}
