//! Core relay server implementation.
//!
//! This module contains the `RelayServer` struct: it binds the listener and
//! runs the accept loop, spawning one independent worker per connection.

use crate::{
    config::ServerConfig,
    connection::ConnectionRegistry,
    error::ServerError,
    server::handlers::{handle_connection, HandlerContext},
    shutdown::ShutdownState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept`, e.g. when the process is out of file
/// descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The WebSocket to TCP relay server.
///
/// `RelayServer` owns the configuration and the registry of live
/// connections. Connections are served by independent workers that share
/// nothing but read-only policy data and the shutdown token.
///
/// # Architecture
///
/// * **Accept loop**: one listener, one spawned task per accepted socket
/// * **Connection limit**: sockets beyond `max_connections` are closed before the handshake
/// * **Shutdown**: the accept loop ends as soon as the [`ShutdownState`] fires;
///   running relays see the same token and stop on their own
pub struct RelayServer {
    /// Server configuration parameters
    config: Arc<ServerConfig>,

    /// Live connections, for status reporting and the connection limit
    registry: Arc<ConnectionRegistry>,
}

impl RelayServer {
    /// Creates a new relay server with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration parameters
    ///
    /// # Returns
    ///
    /// A new `RelayServer` instance ready to be started.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Gets the registry of live connections.
    pub fn get_registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })
    }

    /// Starts the relay server and accepts connections until shutdown is
    /// initiated through `shutdown_state`.
    ///
    /// # Arguments
    ///
    /// * `shutdown_state` - Shared shutdown state for coordinating graceful shutdown
    ///
    /// # Returns
    ///
    /// `Ok(())` when the accept loop stopped because of shutdown, or a
    /// `ServerError` if the listener could not be bound or TLS could not be
    /// set up.
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop on an already bound listener.
    ///
    /// Workers that are still running when this returns keep going until
    /// their relay observes the shutdown and they have sent their notice.
    pub async fn serve(&self, listener: TcpListener, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let handler = Arc::new(HandlerContext::new(self.config.clone(), shutdown_state.clone())?);

        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        let scheme = if handler.tls.is_some() { "wss" } else { "ws" };
        match local_addr {
            Some(addr) => info!("🚀 Relay server listening on {}://{}", scheme, addr),
            None => info!("🚀 Relay server listening ({})", scheme),
        }
        info!(
            "🎯 Default target: {}:{}",
            self.config.policy.default_hostname, self.config.policy.default_port
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_state.initiated() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if self.registry.len() >= self.config.max_connections {
                            warn!(
                                "🚧 Connection limit of {} reached, dropping connection from {}",
                                self.config.max_connections, addr
                            );
                            drop(stream);
                            continue;
                        }

                        // Registered here rather than in the worker so the
                        // next limit check already counts this connection.
                        let (context, registration) = ConnectionRegistry::register(&self.registry, addr);
                        debug!(connection_id = context.id(), "📥 Accepted connection from {}", addr);
                        tokio::spawn(handle_connection(stream, context, registration, handler.clone()));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        info!(
            "🧹 Accept loop stopped with {} connection(s) still open",
            self.registry.len()
        );
        Ok(())
    }
}
