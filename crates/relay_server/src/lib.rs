//! # Relay Server - WebSocket to TCP Relay
//!
//! A relay that accepts browser WebSocket connections and forwards their
//! traffic to a backend TCP service, typically a telnet or rlogin BBS. The
//! relay is a transparent pipe: bytes are never interpreted, only forwarded.
//!
//! ## Design Philosophy
//!
//! The proxy must never become an open relay. Every connection passes an
//! authorization gate before any target is contacted:
//!
//! * **Default target** - `/` always relays to the configured host and port
//! * **Explicit targets** - `/host/port` is allowed on the default host for the
//!   default and rlogin ports, and elsewhere only when an allow-list says so
//! * **Fail closed** - a missing, empty or unreadable allow-list denies
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Relay Server** - Accept loop, one independent worker per connection
//! * **Connection Handler** - Handshake, ping route, audit, authorization,
//!   target connect, relay and user-facing notices
//! * **Connection Authorizer** - The host:port decision
//! * **Relay Session** - Bidirectional forwarding until one side closes or
//!   shutdown is requested
//!
//! ### Connection Flow
//!
//! 1. Client connects; Flash policy probes are answered and closed
//! 2. WebSocket handshake (optionally over TLS) yields the requested path
//! 3. `/ping` echoes one line and closes
//! 4. Anything else is written to the audit log, then authorized
//! 5. Allowed targets are connected and relayed; denied ones get a notice
//!
//! ## Configuration
//!
//! The server is configured through the [`ServerConfig`] struct:
//!
//! * **Network settings** - Bind address, connection limit, timeouts
//! * **Authorization policy** - Default target, rlogin port, allow-list file
//! * **Audit log** - Where connection records are appended
//! * **TLS** - Certificate and key for `wss://`
//!
//! ```rust,no_run
//! use relay_server::{create_server_with_config, ServerConfig, ShutdownState};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), relay_server::ServerError> {
//! let config = ServerConfig {
//!     bind_address: "0.0.0.0:1123".parse().unwrap(),
//!     ..Default::default()
//! };
//! let server = create_server_with_config(config);
//! server.start_with_shutdown_state(ShutdownState::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The server uses structured error types to categorize failures:
//!
//! * [`ServerError`] - Faults that stop the server or end a single worker
//! * [`error::EndpointError`] - Endpoint I/O failures inside a relay
//! * [`error::PolicyLoadError`] - Allow-list problems, always turned into a denial
//! * [`error::TlsError`] - Certificate and key loading
//!
//! ## Concurrency
//!
//! Workers share no mutable state except the [`ShutdownState`] token and
//! the allow-list file. The [`connection::ConnectionRegistry`] is a
//! read-only view used for status reports and the connection limit.

// Re-export core types and functions for easy access
pub use auth::{Authorization, ConnectionAuthorizer, TargetRequest, TargetSpec};
pub use config::{AuthorizationPolicy, ServerConfig, TlsSettings};
pub use error::ServerError;
pub use relay::{ExitReason, RelayOutcome, RelaySession};
pub use server::RelayServer;
pub use shutdown::ShutdownState;
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod audit;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod utils;
