use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cluster::errors::classify_reply_error;
use crate::core::command::Cmd;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Factory producing a [`NodeConnection`] for a `(network, address)` pair.
///
/// The cluster carries one of these so callers can hook connection setup
/// (authentication, custom timeouts) without touching routing logic.
pub type DialFunc = Arc<
    dyn Fn(String, String) -> Pin<Box<dyn Future<Output = Result<NodeConnection>> + Send>>
        + Send
        + Sync,
>;

/// Returns the stock dialer: plain TCP with the given I/O timeout applied to
/// connect, reads and writes.
pub fn default_dialer(timeout: Option<Duration>) -> DialFunc {
    Arc::new(move |_network, addr| {
        Box::pin(async move { NodeConnection::dial(&addr, timeout).await })
    })
}

/// A connection to one node of the cluster.
///
/// Wraps a TCP stream with the RESP codec and remembers the last critical
/// (network-level) failure, which is how the pool decides whether a returned
/// connection is still worth keeping.
pub struct NodeConnection {
    stream: TcpStream,
    decoder: Decoder,
    encoder: Encoder,
    addr: String,
    timeout: Option<Duration>,
    last_critical: Option<io::ErrorKind>,
}

impl NodeConnection {
    /// Dials `addr` and returns a ready connection.
    ///
    /// When `timeout` is set it bounds the connect as well as every
    /// subsequent read and write on the connection.
    pub async fn dial(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let connect = TcpStream::connect(addr);
        let stream = match timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))??,
            None => connect.await?,
        };
        Ok(Self {
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            addr: addr.to_string(),
            timeout,
            last_critical: None,
        })
    }

    /// The remote address this connection was dialed to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The kind of the last network-level failure seen on this connection,
    /// if any. A connection with a critical error must not be reused.
    pub fn last_critical(&self) -> Option<io::ErrorKind> {
        self.last_critical
    }

    /// Executes one command and returns the reply.
    ///
    /// An error reply from the server is classified into
    /// [`Error::Moved`]/[`Error::Ask`]/[`Error::Server`]; network failures
    /// (including the peer hanging up) come back as [`Error::Io`] and mark
    /// the connection critical.
    pub async fn command(&mut self, cmd: Cmd) -> Result<Frame> {
        self.write_frame(&cmd.into_frame()).await?;
        match self.read_frame().await? {
            Frame::Error(msg) => Err(classify_reply_error(&msg)),
            frame => Ok(frame),
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.encoder.encode(frame);
        let data = self.encoder.take();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.stream.write_all(&data))
                .await
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"))),
            None => self.stream.write_all(&data).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.critical(e)),
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(frame);
            }
            let mut buf = vec![0u8; 4096];
            let result = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.stream.read(&mut buf))
                    .await
                    .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))),
                None => self.stream.read(&mut buf).await,
            };
            let n = match result {
                Ok(n) => n,
                Err(e) => return Err(self.critical(e)),
            };
            if n == 0 {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
                return Err(self.critical(eof));
            }
            self.decoder.append(&buf[..n]);
        }
    }

    fn critical(&mut self, source: io::Error) -> Error {
        self.last_critical = Some(source.kind());
        Error::Io { source }
    }

    #[cfg(test)]
    pub(crate) fn poison(&mut self) {
        self.last_critical = Some(io::ErrorKind::BrokenPipe);
    }
}

impl fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConnection")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .field("last_critical", &self.last_critical)
            .finish()
    }
}
