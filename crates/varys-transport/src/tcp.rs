//! TCP transport: connection setup plus framed read/write for both the
//! multiplexed control-plane protocol and the one-shot data-plane protocol.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whether to enable TCP_NODELAY (disable Nagle's algorithm).
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self { connect_timeout_ms: 5000, nodelay: true }
    }
}

/// TCP transport — creates and accepts connections.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    /// Creates a new TCP transport with the given configuration.
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    /// Establishes a TCP connection to the specified address.
    pub async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        let timeout = std::time::Duration::from_millis(self.config.connect_timeout_ms);
        let stream = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                addr: addr.to_string(),
                timeout_ms: self.config.connect_timeout_ms,
            })?
            .map_err(TransportError::IoError)?;
        if self.config.nodelay {
            stream.set_nodelay(true).map_err(TransportError::IoError)?;
        }
        tracing::debug!(addr = addr, "TCP connected");
        TcpConnection::from_stream(stream)
    }

    /// Binds to the specified address and returns a listener for incoming connections.
    pub async fn listen(&self, addr: &str) -> Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::bind(addr).await.map_err(TransportError::IoError)
    }

    /// Accepts an incoming TCP connection from the listener.
    pub async fn accept(&self, listener: &tokio::net::TcpListener) -> Result<TcpConnection> {
        let (stream, _) = listener.accept().await.map_err(TransportError::IoError)?;
        if self.config.nodelay {
            stream.set_nodelay(true).map_err(TransportError::IoError)?;
        }
        TcpConnection::from_stream(stream)
    }
}

/// A single TCP connection with concurrent read/write support.
pub struct TcpConnection {
    read: Mutex<OwnedReadHalf>,
    write: Mutex<OwnedWriteHalf>,
    peer_addr: String,
    local_addr: String,
}

impl TcpConnection {
    /// Adopts an already-accepted or already-connected raw stream. Exposed so
    /// callers that need the stream before it is split (e.g. to peek at the
    /// first bytes and decide which wire protocol is in play) can still hand
    /// the connection off to this type afterward.
    pub fn from_stream(stream: tokio::net::TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        let local_addr = stream.local_addr().map(|a| a.to_string()).unwrap_or_default();
        let (read, write) = stream.into_split();
        Ok(Self { read: Mutex::new(read), write: Mutex::new(write), peer_addr, local_addr })
    }

    /// Sends a control-plane frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let encoded = frame.encode();
        let mut write = self.write.lock().await;
        write.write_all(&encoded).await.map_err(TransportError::IoError)?;
        write.flush().await.map_err(TransportError::IoError)?;
        Ok(())
    }

    /// Receives a control-plane frame, blocking until the full header and payload arrive.
    pub async fn recv_frame(&self) -> Result<Frame> {
        let mut read = self.read.lock().await;
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        read.read_exact(&mut header_buf).await.map_err(TransportError::IoError)?;
        let header = Frame::decode_header(&header_buf)?;
        if header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: header.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        let mut payload = vec![0u8; header.payload_length as usize];
        if !payload.is_empty() {
            read.read_exact(&mut payload).await.map_err(TransportError::IoError)?;
        }
        Ok(Frame { header, payload })
    }

    /// Writes a single length-prefixed blob (the data-plane framing of §6.2).
    pub async fn send_blob(&self, payload: &[u8]) -> Result<()> {
        let mut write = self.write.lock().await;
        write.write_all(&(payload.len() as u32).to_be_bytes()).await.map_err(TransportError::IoError)?;
        write.write_all(payload).await.map_err(TransportError::IoError)?;
        write.flush().await.map_err(TransportError::IoError)?;
        Ok(())
    }

    /// Reads a single length-prefixed blob.
    pub async fn recv_blob(&self) -> Result<Vec<u8>> {
        let mut read = self.read.lock().await;
        let mut len_buf = [0u8; 4];
        read.read_exact(&mut len_buf).await.map_err(TransportError::IoError)?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge { size: len, max_size: MAX_PAYLOAD_SIZE });
        }
        let mut payload = vec![0u8; len as usize];
        if !payload.is_empty() {
            read.read_exact(&mut payload).await.map_err(TransportError::IoError)?;
        }
        Ok(payload)
    }

    /// Returns the remote peer address of this TCP connection as a string.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Returns the local address of this TCP connection as a string.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Splits off the raw read half for use as a plain `AsyncRead` (the client's
    /// data-plane socket, wrapped by a throttled reader after the initial blobs).
    pub fn into_read_half(self) -> OwnedReadHalf {
        self.read.into_inner()
    }
}
