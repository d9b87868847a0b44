//! Error types and handling for the relay server.
//!
//! This module defines the error types that can occur during server operations,
//! providing clear categorization of different failure modes. Expected outcomes
//! such as an authorization denial or a peer hanging up are not errors and are
//! modelled as plain values elsewhere; what remains here are genuine faults.

use std::path::PathBuf;

/// Enumeration of possible server errors.
///
/// Anything that escapes a connection worker ends up as one of these and is
/// logged once by the worker's top-level catch.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// TLS setup failed
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The audit record could not be written
    #[error("Failed to append audit record to '{path}': {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a client or target endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// WebSocket protocol or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Raw socket failure
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Write attempted after the peer went away
    #[error("Endpoint is closed")]
    Closed,
}

/// Reasons the relay allow-list could not be used.
///
/// Every variant makes the authorizer fail closed.
#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    #[error("Relay file does not exist: '{0}'")]
    Missing(PathBuf),

    #[error("Relay file is empty: '{0}'")]
    Empty(PathBuf),

    #[error("Error reading relay file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// TLS configuration and certificate loading errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load certificate from '{path}': {reason}")]
    CertLoad { path: PathBuf, reason: String },

    #[error("Failed to load private key from '{path}': {reason}")]
    KeyLoad { path: PathBuf, reason: String },

    #[error("TLS configuration error: {0}")]
    Config(String),
}
