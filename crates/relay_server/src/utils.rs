//! Utility functions and helper methods for the relay server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::RelayServer};

/// Creates a new relay server with default configuration.
///
/// The default relays `/` to `localhost:23` and listens on
/// `127.0.0.1:1123`.
///
/// # Example
///
/// ```rust
/// use relay_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.config().max_connections, 1000);
/// ```
pub fn create_server() -> RelayServer {
    RelayServer::new(ServerConfig::default())
}

/// Creates a new relay server with custom configuration.
///
/// # Arguments
///
/// * `config` - A `ServerConfig` instance with desired settings
///
/// # Example
///
/// ```rust
/// use relay_server::{create_server_with_config, AuthorizationPolicy, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     policy: AuthorizationPolicy {
///         default_hostname: "bbs.example.com".to_string(),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().policy.default_port, 23);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> RelayServer {
    RelayServer::new(config)
}
