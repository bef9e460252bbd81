//! The client's connection to the coordinator.
//!
//! Grounded on `varys_transport::rpc::RpcClient`'s request/reply demultiplex
//! pattern, but extended with a second dispatch path: frames that carry no
//! matching pending request id are treated as an unsolicited push and handed
//! to a rate-update callback rather than dropped. `UpdatedRates` is the only
//! message the coordinator ever sends without being asked.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::warn;
use varys_transport::{Frame, Tag, TcpConnection};

use varys_core::{Result, VarysError};

/// Default synchronous-ask timeout (`varys.framework.ask.wait`).
pub const DEFAULT_ASK_TIMEOUT_MS: u64 = 5000;

/// The client's half of the control-plane connection to the coordinator.
pub struct CoordinatorLink {
    conn: Arc<TcpConnection>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>,
    ask_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CoordinatorLink {
    /// Connects the reader task, dispatching unmatched frames to `on_push`.
    pub fn new(
        conn: Arc<TcpConnection>,
        ask_timeout_ms: u64,
        on_push: impl Fn(Frame) + Send + Sync + 'static,
    ) -> Self {
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>> = Arc::new(Mutex::new(HashMap::new()));
        let reader_conn = conn.clone();
        let reader_pending = pending.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader_conn.recv_frame().await {
                    Ok(frame) => {
                        let mut map = reader_pending.lock().await;
                        if let Some(tx) = map.remove(&frame.request_id()) {
                            let _ = tx.send(frame);
                        } else {
                            drop(map);
                            on_push(frame);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "coordinator link reader stopped");
                        break;
                    }
                }
            }
        });
        Self {
            conn,
            next_id: AtomicU64::new(1),
            pending,
            ask_timeout: Duration::from_millis(ask_timeout_ms),
            reader_handle: handle,
        }
    }

    /// Sends a request and blocks for up to the configured timeout for a reply.
    pub async fn ask(&self, tag: Tag, payload: Vec<u8>) -> Result<Frame> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(tag, request_id, payload);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        self.conn
            .send_frame(&frame)
            .await
            .map_err(|e| VarysError::Connectivity(e.to_string()))?;

        match tokio::time::timeout(self.ask_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(VarysError::Connectivity("coordinator link closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(VarysError::Timeout { what: format!("{tag:?}"), timeout_ms: self.ask_timeout.as_millis() as u64 })
            }
        }
    }

    /// Sends a fire-and-forget message; no reply is awaited, and failures are
    /// swallowed by callers that use this for `stop()`-style best-effort sends.
    pub async fn tell(&self, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(tag, request_id, payload);
        self.conn.send_frame(&frame).await.map_err(|e| VarysError::Connectivity(e.to_string()))
    }
}

impl Drop for CoordinatorLink {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}
