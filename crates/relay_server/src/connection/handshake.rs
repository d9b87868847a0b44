//! Opening a client connection: TLS, legacy probes and the WebSocket upgrade.

use super::endpoint::WebSocketEndpoint;
use super::tls::{ClientStream, TlsAcceptor};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};

/// The protocol recorded for every accepted connection.
pub const WEBSOCKET_PROTOCOL: &str = "RFC6455";

/// Flash clients ask for this before opening a socket to a host.
const POLICY_FILE_REQUEST: &[u8] = b"<policy-file-request/>";

/// What we learned from a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Request path, without the query string
    pub path: String,
    pub protocol: String,
    /// Negotiated sub-protocol, empty if the client offered none
    pub sub_protocol: String,
    pub tls: bool,
}

/// Result of [`open`].
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// A WebSocket session is established.
    Accepted(WebSocketEndpoint<ClientStream>, HandshakeInfo),
    /// A Flash cross-domain policy request was answered; nothing else to do.
    LegacyProbe,
    /// Not a usable WebSocket connection.
    Invalid(String),
}

/// Performs the server side of the connection opening.
///
/// # Arguments
///
/// * `stream` - The freshly accepted socket
/// * `tls` - Acceptor for `wss://` listeners
/// * `timeout` - Upper bound for the whole opening exchange
///
/// On plain listeners the first bytes are peeked so a Flash policy request
/// can be answered before the WebSocket upgrade is attempted.
pub async fn open(stream: TcpStream, tls: Option<&TlsAcceptor>, timeout: Duration) -> HandshakeOutcome {
    match tokio::time::timeout(timeout, open_inner(stream, tls)).await {
        Ok(outcome) => outcome,
        Err(_) => HandshakeOutcome::Invalid(format!("handshake timed out after {timeout:?}")),
    }
}

async fn open_inner(mut stream: TcpStream, tls: Option<&TlsAcceptor>) -> HandshakeOutcome {
    let client_stream = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => ClientStream::Tls(tls_stream),
            Err(e) => return HandshakeOutcome::Invalid(format!("TLS handshake failed: {e}")),
        },
        None => {
            let mut first = [0u8; 1];
            match stream.peek(&mut first).await {
                Ok(0) => return HandshakeOutcome::Invalid("connection closed before handshake".to_string()),
                Ok(_) if first[0] == b'<' => return answer_policy_request(&mut stream).await,
                Ok(_) => ClientStream::Plain(stream),
                Err(e) => return HandshakeOutcome::Invalid(format!("failed to read handshake: {e}")),
            }
        }
    };
    let tls_used = client_stream.is_tls();

    let mut path = String::new();
    let mut sub_protocol = String::new();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();

        let offered = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').map(str::trim).find(|p| !p.is_empty()));
        if let Some(protocol) = offered {
            if let Ok(value) = HeaderValue::from_str(protocol) {
                response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                sub_protocol = protocol.to_string();
            }
        }
        Ok(response)
    };

    let accepted = tokio_tungstenite::accept_hdr_async(client_stream, callback).await;
    match accepted {
        Ok(ws_stream) => HandshakeOutcome::Accepted(
            WebSocketEndpoint::new(ws_stream),
            HandshakeInfo {
                path,
                protocol: WEBSOCKET_PROTOCOL.to_string(),
                sub_protocol,
                tls: tls_used,
            },
        ),
        Err(e) => HandshakeOutcome::Invalid(format!("WebSocket handshake failed: {e}")),
    }
}

/// Reads a NUL-terminated request and, if it is a policy file request,
/// answers it with a policy allowing access to the listening port.
async fn answer_policy_request(stream: &mut TcpStream) -> HandshakeOutcome {
    let mut request = Vec::with_capacity(POLICY_FILE_REQUEST.len() + 1);
    let mut byte = [0u8; 1];
    while request.len() <= POLICY_FILE_REQUEST.len() {
        match stream.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) if byte[0] == 0 => break,
            Ok(_) => request.push(byte[0]),
            Err(e) => return HandshakeOutcome::Invalid(format!("failed to read request: {e}")),
        }
    }

    if request != POLICY_FILE_REQUEST {
        return HandshakeOutcome::Invalid("unrecognized pre-handshake request".to_string());
    }

    let port = match stream.local_addr() {
        Ok(addr) => addr.port().to_string(),
        Err(_) => "*".to_string(),
    };
    let policy = policy_document(&port);

    match stream.write_all(policy.as_bytes()).await {
        Ok(()) => {
            let _ = stream.shutdown().await;
            HandshakeOutcome::LegacyProbe
        }
        Err(e) => HandshakeOutcome::Invalid(format!("failed to answer policy request: {e}")),
    }
}

fn policy_document(ports: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <!DOCTYPE cross-domain-policy SYSTEM \"http://www.adobe.com/xml/dtds/cross-domain-policy.dtd\">\
         <cross-domain-policy><allow-access-from domain=\"*\" to-ports=\"{ports}\" /></cross-domain-policy>\0"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsSettings;
    use crate::connection::Endpoint;
    use futures_util::{SinkExt, StreamExt};
    use rustls::pki_types::ServerName;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;

    async fn accept_one(listener: &TcpListener) -> HandshakeOutcome {
        let (stream, _) = listener.accept().await.unwrap();
        open(stream, None, Duration::from_secs(2)).await
    }

    #[tokio::test]
    async fn test_websocket_upgrade_records_path_and_sub_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut request = format!("ws://{addr}/bbs.example.com/23?x=1")
                .into_client_request()
                .unwrap();
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("plain, binary"));
            let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();
            assert_eq!(
                response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
                "plain"
            );
            ws.send(Message::text("hi".to_string())).await.unwrap();
            ws
        });

        match accept_one(&listener).await {
            HandshakeOutcome::Accepted(_, info) => {
                assert_eq!(info.path, "/bbs.example.com/23");
                assert_eq!(info.protocol, "RFC6455");
                assert_eq!(info.sub_protocol, "plain");
                assert!(!info.tls);
            }
            other => panic!("expected accepted handshake, got {other:?}"),
        }
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_policy_file_request_is_answered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"<policy-file-request/>\0").await.unwrap();
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await.unwrap();
            String::from_utf8(reply).unwrap()
        });

        assert!(matches!(accept_one(&listener).await, HandshakeOutcome::LegacyProbe));

        let reply = client.await.unwrap();
        assert!(reply.contains("<cross-domain-policy>"));
        assert!(reply.contains(&format!("to-ports=\"{}\"", addr.port())));
        assert!(reply.ends_with('\0'));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"HELLO THERE\r\n\r\n").await.unwrap();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        assert!(matches!(accept_one(&listener).await, HandshakeOutcome::Invalid(_)));
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let outcome = open(stream, None, Duration::from_millis(50)).await;
        assert!(matches!(outcome, HandshakeOutcome::Invalid(reason) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_tls_upgrade_relays_frames() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let settings = TlsSettings {
            cert_path: dir.path().join("cert.pem"),
            key_path: dir.path().join("key.pem"),
        };
        std::fs::write(&settings.cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&settings.key_path, certified.key_pair.serialize_pem()).unwrap();
        let acceptor = TlsAcceptor::new(&settings).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_cert = certified.cert.der().clone();

        let client = tokio::spawn(async move {
            let mut roots = rustls::RootCertStore::empty();
            roots.add(server_cert).unwrap();
            let provider = Arc::new(rustls::crypto::ring::default_provider());
            let config = rustls::ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .unwrap()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let connector = tokio_rustls::TlsConnector::from(Arc::new(config));

            let tcp = TcpStream::connect(addr).await.unwrap();
            let tls = connector
                .connect(ServerName::try_from("localhost").unwrap(), tcp)
                .await
                .unwrap();
            let url = format!("wss://localhost:{}/bbs.example.com/23", addr.port());
            let (mut ws, _) = tokio_tungstenite::client_async(url, tls).await.unwrap();

            ws.send(Message::text("login: ".to_string())).await.unwrap();
            loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Binary(data) => break data.to_vec(),
                    _ => continue,
                }
            }
        });

        let (stream, _) = listener.accept().await.unwrap();
        match open(stream, Some(&acceptor), Duration::from_secs(5)).await {
            HandshakeOutcome::Accepted(mut endpoint, info) => {
                assert!(info.tls);
                assert_eq!(info.path, "/bbs.example.com/23");

                let data = endpoint.read_bytes().await.unwrap().unwrap();
                assert_eq!(data, b"login: ");
                endpoint.write_bytes(b"\xff\xfb\x01welcome").await.unwrap();
                assert_eq!(client.await.unwrap(), b"\xff\xfb\x01welcome");
            }
            other => panic!("expected accepted handshake, got {other:?}"),
        }
    }
}
