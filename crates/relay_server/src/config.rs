//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the relay server behavior.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Configuration structure for the relay server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, the authorization policy, the audit log and TLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Upper bound for the WebSocket (and TLS) handshake in milliseconds
    pub handshake_timeout_ms: u64,

    /// Upper bound for connecting to the relay target in milliseconds
    pub connect_timeout_ms: u64,

    /// Pause after a final notice so the user can read it, in milliseconds
    pub notice_delay_ms: u64,

    /// How long the `/ping` route waits for a line, in milliseconds
    pub ping_timeout_ms: u64,

    /// Which targets the proxy may connect to
    pub policy: AuthorizationPolicy,

    /// Append-only audit log of accepted connections
    pub audit_log_path: PathBuf,

    /// Certificate and key for `wss://` listeners (None means plain `ws://`)
    pub tls: Option<TlsSettings>,
}

/// Read-only authorization policy consulted for every proxied connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    /// Target used for the root path and as the implicitly trusted host
    pub default_hostname: String,

    /// Port of the default target
    pub default_port: u16,

    /// Secondary port allowed on the default host only (0 disables it)
    pub rlogin_port: u16,

    /// Allow-list of additional relay targets, re-read on every check
    pub relay_file: Option<PathBuf>,
}

/// TLS certificate material for the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM file with the certificate chain
    pub cert_path: PathBuf,

    /// PEM file with the private key
    pub key_path: PathBuf,
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn notice_delay(&self) -> Duration {
        Duration::from_millis(self.notice_delay_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 1123)),
            max_connections: 1000,
            handshake_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            notice_delay_ms: 2500,
            ping_timeout_ms: 1000,
            policy: AuthorizationPolicy::default(),
            audit_log_path: PathBuf::from("connections.log"),
            tls: None,
        }
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            default_hostname: "localhost".to_string(),
            default_port: 23,
            rlogin_port: 513,
            relay_file: None,
        }
    }
}
