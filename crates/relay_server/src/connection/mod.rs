//! Connection-level plumbing.
//!
//! This module handles everything that touches a single client connection
//! below the orchestration level: per-connection bookkeeping, the endpoint
//! abstraction shared by both relay sides, the WebSocket handshake, TLS, and
//! the terminal control sequences used for user-facing notices.

pub mod ansi;
pub mod context;
pub mod endpoint;
pub mod handshake;
pub mod registry;
pub mod tls;

pub use context::ConnectionContext;
pub use endpoint::{ByteReader, ByteWriter, Endpoint, StreamEndpoint, TcpConnector, WebSocketEndpoint};
pub use handshake::{HandshakeInfo, HandshakeOutcome};
pub use registry::{ConnectionRegistry, RegistrationGuard};
pub use tls::{ClientStream, TlsAcceptor};

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify client connections
/// throughout their lifecycle on the server and appear in every log line
/// about the connection.
pub type ConnectionId = usize;
