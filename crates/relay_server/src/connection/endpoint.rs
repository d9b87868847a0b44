//! The endpoint abstraction shared by both sides of a relay.
//!
//! The client side is a WebSocket ([`WebSocketEndpoint`]), the target side a
//! raw byte stream ([`StreamEndpoint`]), and the relay loop only ever sees
//! the [`Endpoint`] trait and the halves it splits into.

use crate::error::EndpointError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// The receiving half of a split endpoint.
#[async_trait]
pub trait ByteReader: Send {
    /// Waits for data and returns everything currently available.
    ///
    /// `Ok(None)` means the peer closed the connection. Must be cancel safe.
    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError>;
}

/// The sending half of a split endpoint.
#[async_trait]
pub trait ByteWriter: Send {
    /// Writes `data` verbatim.
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError>;
}

/// One side of a relay.
///
/// Implementations must make [`Endpoint::read_bytes`] cancel safe: if the
/// returned future is dropped before completing, no data may be lost.
///
/// [`Endpoint::split`] borrows the endpoint as independent halves so the
/// relay can wait on a read in one direction while a write in the other
/// direction is still pending.
#[async_trait]
pub trait Endpoint: Send {
    type Reader<'a>: ByteReader + 'a
    where
        Self: 'a;
    type Writer<'a>: ByteWriter + 'a
    where
        Self: 'a;

    /// Waits for data and returns everything currently available.
    ///
    /// `Ok(None)` means the peer closed the connection.
    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError>;

    /// Writes `data` verbatim.
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError>;

    /// Writes terminal text.
    async fn write_text(&mut self, text: &str) -> Result<(), EndpointError> {
        self.write_bytes(text.as_bytes()).await
    }

    /// Writes terminal text followed by CRLF.
    async fn write_line(&mut self, text: &str) -> Result<(), EndpointError> {
        self.write_text(&format!("{text}\r\n")).await
    }

    /// Closes the endpoint gracefully. Errors are ignored; the peer may
    /// already be gone.
    async fn close(&mut self);

    /// Borrows the endpoint as a reader and a writer that can be driven
    /// concurrently.
    fn split(&mut self) -> (Self::Reader<'_>, Self::Writer<'_>);
}

/// A raw byte stream endpoint, used for the relay target.
#[derive(Debug)]
pub struct StreamEndpoint<S> {
    stream: S,
    buffer: Box<[u8]>,
}

impl<S> StreamEndpoint<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }

}

#[async_trait]
impl<S> Endpoint for StreamEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Reader<'a>
        = StreamReader<'a, S>
    where
        Self: 'a;
    type Writer<'a>
        = StreamWriter<'a, S>
    where
        Self: 'a;

    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError> {
        let n = self.stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer[..n].to_vec()))
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    fn split(&mut self) -> (StreamReader<'_, S>, StreamWriter<'_, S>) {
        let (read, write) = tokio::io::split(&mut self.stream);
        (
            StreamReader {
                inner: read,
                buffer: &mut self.buffer[..],
            },
            StreamWriter { inner: write },
        )
    }
}

/// Reading half of a [`StreamEndpoint`].
pub struct StreamReader<'a, S> {
    inner: ReadHalf<&'a mut S>,
    buffer: &'a mut [u8],
}

#[async_trait]
impl<'a, S> ByteReader for StreamReader<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError> {
        let n = self.inner.read(&mut *self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buffer[..n].to_vec()))
    }
}

/// Writing half of a [`StreamEndpoint`].
pub struct StreamWriter<'a, S> {
    inner: WriteHalf<&'a mut S>,
}

#[async_trait]
impl<'a, S> ByteWriter for StreamWriter<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// The browser side of a relay.
///
/// Text and binary frames are both treated as data. Everything sent to the
/// client goes out as binary frames.
#[derive(Debug)]
pub struct WebSocketEndpoint<S> {
    stream: WebSocketStream<S>,
    closed: bool,
}

impl<S> WebSocketEndpoint<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl<S> Endpoint for WebSocketEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Reader<'a>
        = WebSocketReader<'a, S>
    where
        Self: 'a;
    type Writer<'a>
        = WebSocketWriter<'a, S>
    where
        Self: 'a;

    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError> {
        next_data(&mut self.stream, &mut self.closed).await
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        if self.closed {
            return Err(EndpointError::Closed);
        }
        self.stream.send(Message::Binary(data.to_vec().into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
        let _ = self.stream.close(None).await;
    }

    fn split(&mut self) -> (WebSocketReader<'_, S>, WebSocketWriter<'_, S>) {
        let (sink, stream) = StreamExt::split(&mut self.stream);
        (
            WebSocketReader {
                stream,
                closed: &mut self.closed,
            },
            WebSocketWriter { sink },
        )
    }
}

/// Reading half of a [`WebSocketEndpoint`].
pub struct WebSocketReader<'a, S> {
    stream: SplitStream<&'a mut WebSocketStream<S>>,
    closed: &'a mut bool,
}

#[async_trait]
impl<'a, S> ByteReader for WebSocketReader<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, EndpointError> {
        next_data(&mut self.stream, &mut *self.closed).await
    }
}

/// Writing half of a [`WebSocketEndpoint`].
pub struct WebSocketWriter<'a, S> {
    sink: SplitSink<&'a mut WebSocketStream<S>, Message>,
}

#[async_trait]
impl<'a, S> ByteWriter for WebSocketWriter<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        self.sink.send(Message::Binary(data.to_vec().into())).await?;
        Ok(())
    }
}

/// Returns the payload of the next data frame.
async fn next_data<St>(stream: &mut St, closed: &mut bool) -> Result<Option<Vec<u8>>, EndpointError>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    if *closed {
        return Ok(None);
    }

    // Only control frames are consumed between loop iterations, so
    // dropping this future never loses data.
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
            Some(Ok(Message::Close(_))) | None => {
                *closed = true;
                return Ok(None);
            }
            // Pings are answered by tungstenite on the next write or flush.
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Err(e)) => {
                *closed = true;
                return Err(e.into());
            }
        }
    }
}

/// Connects relay targets over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Opens a TCP connection to `host:port`, bounded by the connect timeout.
    pub async fn connect(&self, host: &str, port: u16) -> io::Result<StreamEndpoint<TcpStream>> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(StreamEndpoint::new(stream))
    }
}
