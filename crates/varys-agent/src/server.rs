//! The agent's accept loop on `commPort`.
//!
//! `commPort` is shared by two protocols: the one-shot length-prefixed
//! data-plane blobs of §6.2 (`GetRequest` / `Option<bytes>`), and the framed
//! control-plane relay messages a local client sends (`AddFlow`,
//! `UnregisterCoflow`, `DeleteFlow`, `GetFlow`). A connection is sniffed by
//! peeking its first four bytes: a framed control message always starts with
//! the protocol magic number; a data-plane blob's length prefix can never
//! collide with it, since the magic's value as a length would exceed
//! `MAX_PAYLOAD_SIZE` many times over.

use std::sync::Arc;

use tracing::{debug, warn};
use varys_core::{GetRequest, Result as VarysResult, VarysError};
use varys_transport::{TcpConnection, TcpTransport, TcpTransportConfig, MAGIC};

use crate::dataserver;
use crate::registration::RegisteredAgent;
use crate::relay;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Option<T> {
    bincode::deserialize(payload).ok()
}

/// Binds `commPort` and serves both protocols until the process exits.
pub async fn run(agent: Arc<RegisteredAgent>) -> VarysResult<()> {
    let bind_addr = format!("0.0.0.0:{}", agent.config.comm_port());
    let transport = TcpTransport::new(TcpTransportConfig::default());
    let listener = transport
        .listen(&bind_addr)
        .await
        .map_err(|e| VarysError::Connectivity(format!("binding {bind_addr}: {e}")))?;
    tracing::info!(addr = %bind_addr, "agent data/relay server listening");

    loop {
        let (stream, peer_addr) = listener
            .accept()
            .await
            .map_err(|e| VarysError::Connectivity(format!("accept failed: {e}")))?;
        debug!(peer = %peer_addr, "accepted connection");

        let mut peek_buf = [0u8; 4];
        if let Err(e) = stream.peek(&mut peek_buf).await {
            warn!(error = %e, "failed to peek connection, dropping");
            continue;
        }
        let is_control_frame = u32::from_be_bytes(peek_buf) == MAGIC;

        let conn = match TcpConnection::from_stream(stream) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!(error = %e, "failed to adopt accepted stream");
                continue;
            }
        };

        let agent = agent.clone();
        if is_control_frame {
            tokio::spawn(async move { serve_relay_connection(agent, conn).await });
        } else {
            tokio::spawn(async move { serve_data_connection(conn).await });
        }
    }
}

async fn serve_relay_connection(agent: Arc<RegisteredAgent>, conn: Arc<TcpConnection>) {
    loop {
        match conn.recv_frame().await {
            Ok(frame) => relay::relay_frame(&agent, &frame).await,
            Err(e) => {
                debug!(error = %e, "relay connection closed");
                break;
            }
        }
    }
}

async fn serve_data_connection(conn: Arc<TcpConnection>) {
    let request = match conn.recv_blob().await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "data connection closed before a request arrived");
            return;
        }
    };
    let Some(req) = decode::<GetRequest>(&request) else {
        warn!("malformed GetRequest on data-plane connection");
        return;
    };
    let response: Option<Vec<u8>> = match dataserver::serve_bytes(&req.flow_desc) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, data_id = %req.flow_desc.data_id, "failed to serve flow bytes");
            None
        }
    };
    if let Err(e) = conn.send_blob(&encode(&response)).await {
        warn!(error = %e, "failed to send data-plane response");
    }
}
