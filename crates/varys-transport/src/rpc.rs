//! Request/reply semantics over a single multiplexed [`TcpConnection`].
//!
//! [`RpcClient`] is used by agents and clients to perform the "synchronous
//! ask" suspension point: send a tagged request, block up to a timeout for
//! the matching reply, and surface a timeout error if none arrives. A late
//! reply that shows up after the timeout is simply dropped.
//!
//! [`serve`] runs the server side: one task per inbound connection, reading
//! frames in order and handing each to an [`RpcHandler`], which decides
//! whether a reply is owed.

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, Tag};
use crate::tcp::{TcpConnection, TcpTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// Configuration for [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Synchronous-ask timeout in milliseconds (`varys.framework.ask.wait`, default 5000).
    pub response_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self { response_timeout_ms: 5000 }
    }
}

/// Client-side half of the multiplexed RPC protocol.
///
/// Owns a background reader task that demultiplexes inbound frames by
/// request id and wakes the matching `call` future.
pub struct RpcClient {
    conn: Arc<TcpConnection>,
    config: RpcClientConfig,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RpcClient {
    /// Creates a new RPC client and starts its background reader task.
    pub fn new(conn: Arc<TcpConnection>, config: RpcClientConfig) -> Self {
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>> = Arc::new(Mutex::new(HashMap::new()));
        let reader_conn = conn.clone();
        let reader_pending = pending.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader_conn.recv_frame().await {
                    Ok(frame) => {
                        let request_id = frame.request_id();
                        let mut map = reader_pending.lock().await;
                        if let Some(tx) = map.remove(&request_id) {
                            let _ = tx.send(frame);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "RPC reader stopped");
                        break;
                    }
                }
            }
        });
        Self { conn, config, next_id: AtomicU64::new(1), pending, reader_handle: handle }
    }

    /// Sends a request and blocks for up to the configured timeout for a reply.
    pub async fn call(&self, tag: Tag, payload: Vec<u8>) -> Result<Frame> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(tag, request_id, payload);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        self.conn.send_frame(&frame).await?;

        let timeout = std::time::Duration::from_millis(self.config.response_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ConnectionReset),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(TransportError::RequestTimeout {
                    request_id,
                    timeout_ms: self.config.response_timeout_ms,
                })
            }
        }
    }

    /// Sends a fire-and-forget message; no reply is awaited.
    pub async fn call_one_way(&self, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(tag, request_id, payload);
        self.conn.send_frame(&frame).await
    }

    /// Stops the background reader task.
    pub fn shutdown(&self) {
        self.reader_handle.abort();
    }
}

/// A reply a handler owes the caller, or nothing for fire-and-forget messages.
pub enum Reply {
    /// Send this tag/payload back to the caller with the same request id.
    Message(Tag, Vec<u8>),
    /// No reply is expected for this message (e.g. `Heartbeat`, `AddFlow`).
    None,
}

/// Implemented by whatever owns a role's mailbox, to turn an inbound frame
/// into a (possibly absent) reply. Implementations typically post a message
/// onto a single-task mailbox and await the handler's own reply channel.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handles one inbound frame and decides what (if anything) to send back.
    async fn handle(&self, frame: Frame) -> Reply;
}

/// Runs the accept loop for `listener`, spawning one reader task per connection.
pub async fn serve(
    _transport: &TcpTransport,
    listener: tokio::net::TcpListener,
    handler: Arc<dyn RpcHandler>,
) -> Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(TransportError::IoError)?;
        debug!(peer = %peer_addr, "accepted connection");
        let handler = handler.clone();
        tokio::spawn(async move {
            let conn = match TcpConnection::from_stream(stream) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "failed to adopt accepted stream");
                    return;
                }
            };
            loop {
                let frame = match conn.recv_frame().await {
                    Ok(f) => f,
                    Err(e) => {
                        debug!(error = %e, "connection closed");
                        break;
                    }
                };
                match handler.handle(frame.clone()).await {
                    Reply::Message(tag, payload) => {
                        let response = frame.reply(tag, payload);
                        if let Err(e) = conn.send_frame(&response).await {
                            warn!(error = %e, "failed to send reply");
                            break;
                        }
                    }
                    Reply::None => {}
                }
            }
        });
    }
}
