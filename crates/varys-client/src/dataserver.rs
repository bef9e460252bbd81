//! The client's own in-process data server: answers `GetRequest`s for the
//! `INMEMORY` flows it has published. Every other data type is served by a
//! host agent, never by this listener.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use varys_core::{DataIdentifier, GetRequest};
use varys_transport::{TcpConnection, TcpTransport, TcpTransportConfig};

/// Shared table of this client's published INMEMORY payloads.
pub type ObjectTable = Arc<Mutex<HashMap<DataIdentifier, Arc<Vec<u8>>>>>;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Option<T> {
    bincode::deserialize(payload).ok()
}

/// Binds `comm_port` and serves `flow_to_object` lookups until the process exits.
pub async fn run(comm_port: u16, objects: ObjectTable) -> varys_core::Result<()> {
    let bind_addr = format!("0.0.0.0:{comm_port}");
    let transport = TcpTransport::new(TcpTransportConfig::default());
    let listener = transport
        .listen(&bind_addr)
        .await
        .map_err(|e| varys_core::VarysError::Connectivity(format!("binding {bind_addr}: {e}")))?;
    tracing::info!(addr = %bind_addr, "client data server listening");

    loop {
        let conn = match transport.accept(&listener).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!(error = %e, "failed to accept data-plane connection");
                continue;
            }
        };
        let objects = objects.clone();
        tokio::spawn(async move { serve_one(conn, objects).await });
    }
}

async fn serve_one(conn: Arc<TcpConnection>, objects: ObjectTable) {
    let request = match conn.recv_blob().await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "data connection closed before a request arrived");
            return;
        }
    };
    let Some(req) = decode::<GetRequest>(&request) else {
        warn!("malformed GetRequest on client data server");
        return;
    };
    let bytes = objects.lock().await.get(&req.flow_desc.data_id).cloned();
    let response: Option<Vec<u8>> = bytes.map(|b| (*b).clone());
    if let Err(e) = conn.send_blob(&encode(&response)).await {
        warn!(error = %e, "failed to send data-plane response");
    }
}
