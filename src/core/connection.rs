use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::core::command::Cmd;
use crate::proto::arg::Arg;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Any duplex byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

/// Type-erased stream used by pooled connections.
pub type BoxedStream = Box<dyn AsyncStream>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A connection to a Redis server.
///
/// Wraps an underlying stream (TCP, in-memory duplex, ...) and runs strictly
/// sequential request/reply exchanges over it. Any transport or framing error
/// marks the connection broken; a broken connection refuses further commands
/// and the pool discards it instead of recycling it.
///
/// # Example
///
/// ```no_run
/// use respool::core::command::Cmd;
/// use respool::core::connection::Connection;
/// use tokio::net::TcpStream;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let stream = TcpStream::connect("127.0.0.1:6379").await?;
///     let mut conn = Connection::new(stream);
///     let reply = conn.send(&Cmd::new("PING")).await?;
///     println!("{}", reply);
///     Ok(())
/// }
/// ```
pub struct Connection<S = BoxedStream> {
    id: u64,
    stream: S,
    decoder: Decoder,
    encoder: Encoder,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    broken: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection with the given stream and no timeouts.
    pub fn new(stream: S) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            read_timeout: None,
            write_timeout: None,
            broken: false,
        }
    }

    /// Configures read and write timeouts for this connection.
    ///
    /// # Arguments
    ///
    /// * `read_timeout` - Optional duration for reading one reply
    /// * `write_timeout` - Optional duration for writing one request
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Process-unique identifier of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once a transport or protocol error has hit this connection.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Marks the connection as unusable, e.g. after the caller abandoned a
    /// reply it was waiting for.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Sends one command and waits for its reply.
    ///
    /// A server error reply is returned as `Ok(Frame::Error(..))`; only
    /// transport and framing failures surface as `Err`, and those break the
    /// connection.
    pub async fn send(&mut self, cmd: &Cmd) -> Result<Frame> {
        let read_timeout = self.read_timeout;
        self.round_trip(cmd, read_timeout).await
    }

    /// Sends a command given as a verb and an argument slice.
    pub async fn send_command(&mut self, name: &str, args: &[Arg]) -> Result<Frame> {
        let read_timeout = self.read_timeout;
        self.encoder.encode_command(name, args);
        self.exchange(read_timeout).await
    }

    /// One request/reply exchange with an explicit read deadline.
    pub(crate) async fn round_trip(
        &mut self,
        cmd: &Cmd,
        read_timeout: Option<Duration>,
    ) -> Result<Frame> {
        cmd.encode(&mut self.encoder);
        self.exchange(read_timeout).await
    }

    async fn exchange(&mut self, read_timeout: Option<Duration>) -> Result<Frame> {
        let request = self.encoder.take();
        if self.broken {
            return Err(Error::Io {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "connection is broken"),
            });
        }

        // Stays set if this future is dropped mid-exchange: a reply may
        // still be in flight, so the stream can no longer be trusted.
        self.broken = true;
        let result = self.write_then_read(&request, read_timeout).await;
        match &result {
            Err(e) if e.is_fatal() => {
                warn!(connection = self.id, error = %e, "connection broken");
            }
            _ => self.broken = false,
        }
        result
    }

    async fn write_then_read(
        &mut self,
        request: &[u8],
        read_timeout: Option<Duration>,
    ) -> Result<Frame> {
        debug!(connection = self.id, bytes = request.len(), "sending command");
        match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.write_all(request))
                .await
                .map_err(|_| Error::Timeout { timeout })??,
            None => self.write_all(request).await?,
        }

        let frame = match read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_reply())
                .await
                .map_err(|_| Error::Timeout { timeout })??,
            None => self.read_reply().await?,
        };
        debug!(connection = self.id, reply = frame.kind(), "received reply");
        Ok(frame)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(frame);
            }
            let n = self.stream.read_buf(self.decoder.buffer_mut()).await?;
            if n == 0 {
                return Err(Error::Protocol {
                    message: if self.decoder.buffered() == 0 {
                        "connection closed by peer".to_string()
                    } else {
                        "connection closed in the middle of a frame".to_string()
                    },
                });
            }
        }
    }

    /// Writes a single frame. This is the server direction of the protocol
    /// and is used by test servers.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.encoder.encode(frame);
        let data = self.encoder.take();
        self.write_all(&data).await
    }

    /// Reads a single frame, honouring the configured read timeout.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let result = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_reply())
                .await
                .unwrap_or(Err(Error::Timeout { timeout })),
            None => self.read_reply().await,
        };
        if matches!(&result, Err(e) if e.is_fatal()) {
            self.broken = true;
        }
        result
    }

    /// Shuts the stream down and drops the connection.
    pub async fn close(mut self) -> Result<()> {
        debug!(connection = self.id, "closing connection");
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl<S> fmt::Debug for Connection<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("broken", &self.broken)
            .finish()
    }
}
