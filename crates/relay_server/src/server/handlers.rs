//! Connection handling logic for relay clients.
//!
//! This module drives one accepted connection from the handshake to cleanup:
//! the `/ping` route, the audit record, the authorization gate, the target
//! connect, the relay itself and the notices shown in the user's terminal.

use crate::{
    audit::{AuditLog, AuditRecord},
    auth::ConnectionAuthorizer,
    config::ServerConfig,
    connection::{
        ansi, handshake, ConnectionContext, ConnectionId, Endpoint, HandshakeInfo, HandshakeOutcome,
        RegistrationGuard, TcpConnector, TlsAcceptor,
    },
    error::ServerError,
    relay::{ExitReason, RelaySession},
    shutdown::ShutdownState,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Liveness route that bypasses authorization and the relay.
pub const PING_PATH: &str = "/ping";

/// Acknowledgement sent by the ping route when no line arrives in time.
pub const PING_ACK: &str = "pong";

/// Everything a connection worker needs, shared by all workers.
///
/// Only read-only policy data, the audit file and the shutdown token are
/// shared; the endpoints of a connection never leave its worker.
#[derive(Debug)]
pub struct HandlerContext {
    pub config: Arc<ServerConfig>,
    pub authorizer: ConnectionAuthorizer,
    pub audit_log: AuditLog,
    pub shutdown: ShutdownState,
    pub connector: TcpConnector,
    pub tls: Option<TlsAcceptor>,
}

impl HandlerContext {
    /// Builds the shared handler state from the server configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS is configured and the certificate material
    /// cannot be loaded.
    pub fn new(
        config: Arc<ServerConfig>,
        shutdown: ShutdownState,
    ) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(TlsAcceptor::new).transpose()?;

        Ok(Self {
            authorizer: ConnectionAuthorizer::new(config.policy.clone()),
            audit_log: AuditLog::new(config.audit_log_path.clone()),
            connector: TcpConnector::new(config.connect_timeout()),
            config,
            shutdown,
            tls,
        })
    }
}

/// Handles a single client connection from establishment to cleanup.
///
/// This is the body of a connection worker. It runs the handshake and the
/// relay, and catches anything unexpected so a fault only ever ends this one
/// connection.
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `context` - The connection's registry entry
/// * `registration` - Keeps the entry alive until the worker ends
/// * `handler` - Shared handler state
pub async fn handle_connection(
    stream: TcpStream,
    context: Arc<ConnectionContext>,
    registration: RegistrationGuard,
    handler: Arc<HandlerContext>,
) {
    let _registration = registration;
    let connection_id = context.id();
    let addr = context.remote_addr();

    let result = AssertUnwindSafe(process_connection(stream, &context, &handler))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => debug!(connection_id, "🔌 Connection from {} closed", addr),
        Ok(Err(e)) => error!(connection_id, "❌ Connection from {} failed: {}", addr, e),
        Err(panic) => error!(
            connection_id,
            "💥 Connection worker for {} panicked: {}",
            addr,
            panic_message(panic.as_ref())
        ),
    }
}

async fn process_connection(
    stream: TcpStream,
    context: &ConnectionContext,
    handler: &HandlerContext,
) -> Result<(), ServerError> {
    let connection_id = context.id();
    let addr = context.remote_addr();

    let outcome = handshake::open(stream, handler.tls.as_ref(), handler.config.handshake_timeout()).await;

    match outcome {
        HandshakeOutcome::Accepted(client, info) => {
            debug!(
                connection_id,
                "🤝 Handshake with {} done (path: {}, sub-protocol: '{}', tls: {})",
                addr,
                info.path,
                info.sub_protocol,
                info.tls
            );
            serve_client(client, &info, context, handler).await
        }
        HandshakeOutcome::LegacyProbe => {
            info!(connection_id, "📜 Answered Flash policy request from {}", addr);
            Ok(())
        }
        HandshakeOutcome::Invalid(reason) => {
            warn!(connection_id, "🚫 Invalid handshake from {}: {}", addr, reason);
            Ok(())
        }
    }
}

/// Serves a client whose handshake has completed.
///
/// # Arguments
///
/// * `client` - The client endpoint, owned for the rest of the connection
/// * `info` - What the handshake negotiated
/// * `context` - Metadata of this connection
/// * `handler` - Shared handler state
///
/// # Returns
///
/// `Ok(())` for every expected ending, including denials and connect
/// failures. Errors are reserved for faults such as a failed audit write.
pub async fn serve_client<C: Endpoint>(
    mut client: C,
    info: &HandshakeInfo,
    context: &ConnectionContext,
    handler: &HandlerContext,
) -> Result<(), ServerError> {
    let connection_id = context.id();
    let addr = context.remote_addr();

    if info.path == PING_PATH {
        answer_ping(&mut client, context, handler.config.ping_timeout()).await;
        client.close().await;
        return Ok(());
    }

    let record = AuditRecord {
        timestamp: chrono::Local::now(),
        client_ip: addr.ip(),
        client_port: addr.port(),
        path: info.path.clone(),
        protocol: info.protocol.clone(),
        sub_protocol: info.sub_protocol.clone(),
    };
    handler.audit_log.append(&record).await?;

    let authorization = handler.authorizer.authorize(&info.path, connection_id).await;
    let target = authorization.target;

    if !authorization.allowed {
        warn!(connection_id, "⛔ Refused relay from {} to {}", addr.ip(), target);
        let notice = if authorization.unparsed {
            format!(
                "Sorry, '{}' does not name a host and port, and for security reasons this proxy won't connect to {target}",
                info.path
            )
        } else {
            format!("Sorry, for security reasons this proxy won't connect to {target}")
        };
        send_notice(&mut client, &notice, connection_id).await;
        pause(handler).await;
        client.close().await;
        return Ok(());
    }

    context.set_target(target.clone());
    send_text(
        &mut client,
        &format!("{}Connecting to {target}...", ansi::clear_screen()),
        connection_id,
    )
    .await;

    let target_endpoint = match handler.connector.connect(&target.hostname, target.port).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(connection_id, "🔌 Unable to connect to {}: {}", target, e);
            send_notice(&mut client, "unable to connect!", connection_id).await;
            pause(handler).await;
            client.close().await;
            return Ok(());
        }
    };

    send_notice(&mut client, "connected!", connection_id).await;
    info!(connection_id, "🔗 Relaying {} <-> {}", addr, target);

    let mut session = RelaySession::new(client, target_endpoint);
    let outcome = session.run(&handler.shutdown, context).await;
    info!(
        connection_id,
        bytes_to_target = outcome.bytes_to_target,
        bytes_to_client = outcome.bytes_to_client,
        "🏁 Relay {} <-> {} ended: {}",
        addr,
        target,
        outcome.reason
    );

    let (mut client, mut target_endpoint) = session.into_parts();
    target_endpoint.close().await;

    let closing_notice = match outcome.reason {
        ExitReason::StopRequested => Some("Proxy server shutting down..."),
        ExitReason::ServerClosed => Some("Server closed connection..."),
        ExitReason::ClientClosed => None,
    };
    if let Some(notice) = closing_notice {
        let text = format!("{}\r\n{notice}", ansi::bottom_of_screen());
        send_text(&mut client, &text, connection_id).await;
        pause(handler).await;
    }

    client.close().await;
    Ok(())
}

/// Result of waiting for one line from the client.
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// The bytes before the first CR or LF, or everything received before
    /// the timeout or a disconnect if no terminator arrived.
    Line(Vec<u8>),
    TimedOut,
    Closed,
}

/// Collects client input for up to `timeout` until a line ends.
///
/// The line may arrive split over several messages. It ends at the first CR
/// or LF; anything after the terminator is discarded.
pub async fn read_line<C: Endpoint + ?Sized>(client: &mut C, timeout: Duration) -> LineRead {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut line = Vec::new();

    loop {
        match tokio::time::timeout_at(deadline, client.read_bytes()).await {
            Ok(Ok(Some(data))) => match data.iter().position(|&b| b == b'\r' || b == b'\n') {
                Some(end) => {
                    line.extend_from_slice(&data[..end]);
                    return LineRead::Line(line);
                }
                None => line.extend_from_slice(&data),
            },
            Ok(Ok(None)) | Ok(Err(_)) if line.is_empty() => return LineRead::Closed,
            Err(_) if line.is_empty() => return LineRead::TimedOut,
            Ok(_) | Err(_) => return LineRead::Line(line),
        }
    }
}

async fn answer_ping<C: Endpoint>(client: &mut C, context: &ConnectionContext, timeout: Duration) {
    let connection_id = context.id();
    let addr = context.remote_addr();

    match read_line(client, timeout).await {
        LineRead::Line(line) => {
            info!(connection_id, "🏓 Ping from {}: '{}'", addr, String::from_utf8_lossy(&line));
            if let Err(e) = client.write_bytes(&line).await {
                debug!(connection_id, "Could not echo ping: {}", e);
            }
        }
        LineRead::TimedOut => {
            info!(connection_id, "🏓 Ping from {} timed out, sending '{}'", addr, PING_ACK);
            send_text(client, PING_ACK, connection_id).await;
        }
        LineRead::Closed => {
            info!(connection_id, "🏓 Ping from {} closed before sending anything", addr);
        }
    }
}

// Notices are best effort; the client may already be gone.
async fn send_text<C: Endpoint + ?Sized>(client: &mut C, text: &str, connection_id: ConnectionId) {
    if let Err(e) = client.write_text(text).await {
        debug!(connection_id, "Could not send notice: {}", e);
    }
}

async fn send_notice<C: Endpoint + ?Sized>(client: &mut C, text: &str, connection_id: ConnectionId) {
    if let Err(e) = client.write_line(text).await {
        debug!(connection_id, "Could not send notice: {}", e);
    }
}

async fn pause(handler: &HandlerContext) {
    tokio::time::sleep(handler.config.notice_delay()).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
