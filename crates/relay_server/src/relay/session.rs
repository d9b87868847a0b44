use crate::connection::{ByteReader, ByteWriter, ConnectionContext, ConnectionId, Endpoint};
use crate::error::EndpointError;
use crate::shutdown::ShutdownState;
use std::fmt;
use tracing::debug;

/// Why a relay session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process is shutting down.
    StopRequested,
    /// The browser side went away.
    ClientClosed,
    /// The relay target went away.
    ServerClosed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopRequested => f.write_str("stop requested"),
            ExitReason::ClientClosed => f.write_str("client closed"),
            ExitReason::ServerClosed => f.write_str("server closed"),
        }
    }
}

/// Summary of a finished relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub reason: ExitReason,
    pub bytes_to_target: u64,
    pub bytes_to_client: u64,
}

/// A pair of connected endpoints and the loop forwarding bytes between them.
///
/// Bytes are never inspected. Whatever one side delivers is written to the
/// other side verbatim and in order.
#[derive(Debug)]
pub struct RelaySession<C, T> {
    client: C,
    target: T,
}

impl<C, T> RelaySession<C, T>
where
    C: Endpoint,
    T: Endpoint,
{
    pub fn new(client: C, target: T) -> Self {
        Self { client, target }
    }

    /// Forwards traffic until one side closes or shutdown is requested.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Checked before starting and raced against both directions
    /// * `context` - Receives an activity update for every client read
    ///
    /// The two directions run independently: a peer that stops reading stalls
    /// only the direction writing to it. The stop signal is polled first and
    /// abandons any write still in progress.
    pub async fn run(&mut self, shutdown: &ShutdownState, context: &ConnectionContext) -> RelayOutcome {
        let connection_id = context.id();
        let mut bytes_to_target: u64 = 0;
        let mut bytes_to_client: u64 = 0;

        if shutdown.is_shutdown_initiated() {
            return RelayOutcome {
                reason: ExitReason::StopRequested,
                bytes_to_target,
                bytes_to_client,
            };
        }

        let reason = {
            let (mut client_reader, mut client_writer) = self.client.split();
            let (mut target_reader, mut target_writer) = self.target.split();

            let upstream = forward(
                &mut client_reader,
                &mut target_writer,
                &mut bytes_to_target,
                || context.touch(),
            );
            let downstream = forward(&mut target_reader, &mut client_writer, &mut bytes_to_client, || {});

            tokio::select! {
                biased;

                _ = shutdown.initiated() => ExitReason::StopRequested,

                end = upstream => match end {
                    Forwarding::ReadEnded(e) => {
                        log_failure(connection_id, "Read from client failed", e);
                        ExitReason::ClientClosed
                    }
                    Forwarding::WriteFailed(e) => {
                        log_failure(connection_id, "Write to target failed", Some(e));
                        ExitReason::ServerClosed
                    }
                },

                end = downstream => match end {
                    Forwarding::ReadEnded(e) => {
                        log_failure(connection_id, "Read from target failed", e);
                        ExitReason::ServerClosed
                    }
                    Forwarding::WriteFailed(e) => {
                        log_failure(connection_id, "Write to client failed", Some(e));
                        ExitReason::ClientClosed
                    }
                },
            }
        };

        RelayOutcome {
            reason,
            bytes_to_target,
            bytes_to_client,
        }
    }

    /// Gives back both endpoints.
    pub fn into_parts(self) -> (C, T) {
        (self.client, self.target)
    }
}

/// How one direction of a relay stopped.
enum Forwarding {
    /// The source closed, with the error if it did not close cleanly.
    ReadEnded(Option<EndpointError>),
    WriteFailed(EndpointError),
}

/// Copies everything `reader` delivers to `writer` until either side fails.
async fn forward<R, W, F>(reader: &mut R, writer: &mut W, forwarded: &mut u64, on_data: F) -> Forwarding
where
    R: ByteReader + ?Sized,
    W: ByteWriter + ?Sized,
    F: Fn(),
{
    loop {
        let data = match reader.read_bytes().await {
            Ok(Some(data)) => data,
            Ok(None) => return Forwarding::ReadEnded(None),
            Err(e) => return Forwarding::ReadEnded(Some(e)),
        };
        on_data();
        if let Err(e) = writer.write_bytes(&data).await {
            return Forwarding::WriteFailed(e);
        }
        *forwarded += data.len() as u64;
    }
}

fn log_failure(connection_id: ConnectionId, what: &str, error: Option<EndpointError>) {
    if let Some(e) = error {
        debug!(connection_id, "{}: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StreamEndpoint;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    struct Harness {
        browser: DuplexStream,
        backend: DuplexStream,
        shutdown: ShutdownState,
        context: Arc<ConnectionContext>,
        task: JoinHandle<(RelayOutcome, StreamEndpoint<DuplexStream>, StreamEndpoint<DuplexStream>)>,
    }

    fn start() -> Harness {
        let (client_side, browser) = tokio::io::duplex(4096);
        let (target_side, backend) = tokio::io::duplex(4096);
        let shutdown = ShutdownState::new();
        let context = Arc::new(ConnectionContext::new(7, "127.0.0.1:5000".parse().unwrap()));

        let task_shutdown = shutdown.clone();
        let task_context = context.clone();
        let task = tokio::spawn(async move {
            let mut session =
                RelaySession::new(StreamEndpoint::new(client_side), StreamEndpoint::new(target_side));
            let outcome = session.run(&task_shutdown, &task_context).await;
            let (client, target) = session.into_parts();
            (outcome, client, target)
        });

        Harness {
            browser,
            backend,
            shutdown,
            context,
            task,
        }
    }

    async fn read_exact(stream: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_bytes_are_forwarded_verbatim_both_ways() {
        let mut h = start();

        let upstream: Vec<u8> = (0..=255u8).collect();
        h.browser.write_all(&upstream).await.unwrap();
        assert_eq!(read_exact(&mut h.backend, upstream.len()).await, upstream);

        h.backend.write_all(b"\xff\xfb\x01login: ").await.unwrap();
        assert_eq!(read_exact(&mut h.browser, 10).await, b"\xff\xfb\x01login: ");

        h.browser.write_all(b"first").await.unwrap();
        h.browser.write_all(b"second").await.unwrap();
        assert_eq!(read_exact(&mut h.backend, 11).await, b"firstsecond");

        drop(h.browser);
        let (outcome, _, _) = h.task.await.unwrap();
        assert_eq!(outcome.reason, ExitReason::ClientClosed);
        assert_eq!(outcome.bytes_to_target, 256 + 11);
        assert_eq!(outcome.bytes_to_client, 10);
    }

    #[tokio::test]
    async fn test_target_close_ends_session() {
        let h = start();
        drop(h.backend);

        let (outcome, _, _) = h.task.await.unwrap();
        assert_eq!(outcome.reason, ExitReason::ServerClosed);
        drop(h.browser);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_session() {
        let mut h = start();
        h.browser.write_all(b"ls\r\n").await.unwrap();
        assert_eq!(read_exact(&mut h.backend, 4).await, b"ls\r\n");

        h.shutdown.initiate_shutdown();
        let (outcome, mut client, mut target) =
            tokio::time::timeout(Duration::from_secs(2), h.task).await.unwrap().unwrap();
        assert_eq!(outcome.reason, ExitReason::StopRequested);

        client.close().await;
        target.close().await;
        let mut rest = Vec::new();
        h.backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_target_does_not_block_other_direction_or_stop() {
        let h = start();
        let (mut browser_reader, mut browser_writer) = tokio::io::split(h.browser);

        // The backend never reads, so the relay's write to it eventually stalls.
        let flood = tokio::spawn(async move {
            let _ = browser_writer.write_all(&vec![b'x'; 64 * 1024]).await;
            browser_writer
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut backend = h.backend;
        backend.write_all(b"hello").await.unwrap();
        let mut greeting = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(2), browser_reader.read_exact(&mut greeting))
            .await
            .expect("target output was held back by the stalled write")
            .unwrap();
        assert_eq!(&greeting, b"hello");

        h.shutdown.initiate_shutdown();
        let (outcome, _, _) = tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .expect("stop signal was not seen while a write was stalled")
            .unwrap();
        assert_eq!(outcome.reason, ExitReason::StopRequested);
        assert_eq!(outcome.bytes_to_client, 5);
        assert!(outcome.bytes_to_target < 64 * 1024);

        flood.abort();
        drop(backend);
    }

    #[tokio::test]
    async fn test_stop_before_start_forwards_nothing() {
        let (client_side, mut browser) = tokio::io::duplex(64);
        let (target_side, _backend) = tokio::io::duplex(64);
        let shutdown = ShutdownState::new();
        shutdown.initiate_shutdown();
        browser.write_all(b"data").await.unwrap();

        let context = ConnectionContext::new(1, "127.0.0.1:1".parse().unwrap());
        let mut session = RelaySession::new(StreamEndpoint::new(client_side), StreamEndpoint::new(target_side));
        let outcome = session.run(&shutdown, &context).await;

        assert_eq!(outcome.reason, ExitReason::StopRequested);
        assert_eq!(outcome.bytes_to_target, 0);
    }

    #[tokio::test]
    async fn test_client_input_updates_activity() {
        let mut h = start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.browser.write_all(b"x").await.unwrap();
        read_exact(&mut h.backend, 1).await;

        assert!(h.context.idle_for() < h.context.connected_for());
        drop(h.browser);
        h.task.await.unwrap();
    }
}
