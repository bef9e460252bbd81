//! `handleGet`: resolve a flow at the coordinator, notify the local agent,
//! then pull bytes directly from the publishing host under the client's
//! last known rate for that flow.

use std::sync::Arc;

use varys_core::{
    CoflowId, DataIdentifier, DataType, FlowId, GetFlowReq, GetRequest, GotFlowDescReply, Result,
    VarysError,
};
use varys_transport::{Tag, TcpTransport, TcpTransportConfig, ThrottledReader, TokenBucket};

use crate::client::Client;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| VarysError::Protocol(e.to_string()))
}

impl Client {
    /// Resolves `(coflow_id, flow_id)`, verifies it is of `expected_type`,
    /// and pulls its bytes from wherever the descriptor says they live.
    pub(crate) async fn handle_get(
        &self,
        coflow_id: CoflowId,
        flow_id: FlowId,
        expected_type: DataType,
    ) -> Result<Vec<u8>> {
        self.require_connected()?;
        let data_id = DataIdentifier::new(coflow_id.clone(), flow_id.clone());

        let req = GetFlowReq {
            flow_id: flow_id.clone(),
            coflow_id: coflow_id.clone(),
            client_id: self.client_id.clone(),
            slave_id: self.slave_id.clone(),
        };
        let reply = self.coordinator.ask(Tag::GetFlow, encode(&req)).await?;
        let GotFlowDescReply(found) = decode(&reply.payload)?;
        let desc = found.ok_or_else(|| VarysError::NotFound(data_id.clone()))?;

        // Tell the local agent the same ask, for receiver-side accounting.
        let _ = self.agent.call_one_way(Tag::GetFlow, encode(&req)).await;

        if desc.data_type != expected_type {
            return Err(VarysError::TypeMismatch {
                id: data_id,
                expected: expected_type.label(),
                found: desc.data_type.label(),
            });
        }

        let addr = format!("{}:{}", desc.origin_host, desc.origin_port);
        let transport = TcpTransport::new(TcpTransportConfig::default());
        let conn = transport
            .connect(&addr)
            .await
            .map_err(|e| VarysError::Connectivity(format!("dialing {addr}: {e}")))?;
        conn.send_blob(&encode(&GetRequest { flow_desc: desc.clone() }))
            .await
            .map_err(|e| VarysError::Connectivity(e.to_string()))?;

        let initial_rate = self.flow_to_rate.lock().await.get(&data_id).copied().unwrap_or(0);
        let bucket = Arc::new(TokenBucket::new(initial_rate));
        self.flow_to_throttle.lock().await.insert(data_id.clone(), bucket.clone());

        let result = read_throttled_blob(conn, bucket).await;
        self.flow_to_throttle.lock().await.remove(&data_id);

        match result? {
            Some(bytes) => Ok(bytes),
            None => Err(VarysError::NotFound(data_id)),
        }
    }

    /// Pulls an `INMEMORY` flow back and deserializes it as `T`.
    pub async fn get_object<T: serde::de::DeserializeOwned>(
        &self,
        coflow_id: CoflowId,
        flow_id: FlowId,
    ) -> Result<T> {
        let bytes = self.handle_get(coflow_id, flow_id, DataType::InMemory).await?;
        bincode::deserialize(&bytes).map_err(|e| VarysError::Protocol(e.to_string()))
    }

    /// Pulls the raw bytes of an `ONDISK` flow.
    pub async fn get_file(&self, coflow_id: CoflowId, flow_id: FlowId) -> Result<Vec<u8>> {
        self.handle_get(coflow_id, flow_id, DataType::OnDisk).await
    }

    /// Pulls the synthesized bytes of a `FAKE` flow.
    pub async fn get_fake(&self, coflow_id: CoflowId, flow_id: FlowId) -> Result<Vec<u8>> {
        self.handle_get(coflow_id, flow_id, DataType::Fake).await
    }
}

async fn read_throttled_blob(
    conn: varys_transport::TcpConnection,
    bucket: Arc<TokenBucket>,
) -> Result<Option<Vec<u8>>> {
    let read_half = conn.into_read_half();
    let mut reader = ThrottledReader::with_bucket(read_half, bucket);

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| VarysError::Connectivity(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| VarysError::Connectivity(e.to_string()))?;
    }
    decode(&payload)
}
