//! `putObject`/`putFile`/`putFake`: publish a flow descriptor and relay
//! `AddFlow` to the local agent. All three are non-blocking — no ack is
//! awaited from either the agent or the coordinator.

use varys_core::{
    AddFlowMsg, CoflowId, DataIdentifier, FileLocation, FlowDescription, FlowId, Result, VarysError,
};
use varys_transport::Tag;

use crate::client::Client;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

impl Client {
    /// Serializes `obj`, publishes an `INMEMORY` flow, and keeps the bytes in
    /// this client's own data server so a later `get` can pull them back.
    pub async fn put_object<T: serde::Serialize>(
        &self,
        flow_id: FlowId,
        obj: &T,
        coflow_id: CoflowId,
        num_receivers: u32,
    ) -> Result<()> {
        self.require_connected()?;
        let bytes = bincode::serialize(obj).map_err(|e| VarysError::Protocol(e.to_string()))?;
        let data_id = DataIdentifier::new(coflow_id, flow_id);
        let size = bytes.len() as u64;
        let class_name = std::any::type_name::<T>();
        let desc = FlowDescription::in_memory(
            data_id.clone(),
            size,
            num_receivers,
            &self.host,
            self.comm_port,
            Some(class_name.to_string()),
        );
        self.flow_to_object.lock().await.insert(data_id, std::sync::Arc::new(bytes));
        self.relay_add_flow(desc).await
    }

    /// Publishes an `ONDISK` flow pointing at `path`. Bytes are resolved by
    /// the local agent (or another host's agent) at `get` time.
    pub async fn put_file(
        &self,
        flow_id: FlowId,
        path: impl Into<String>,
        coflow_id: CoflowId,
        offset: u64,
        size: u64,
        num_receivers: u32,
    ) -> Result<()> {
        self.require_connected()?;
        let data_id = DataIdentifier::new(coflow_id, flow_id);
        let file = FileLocation { path_to_file: path.into(), offset, length: size };
        let desc = FlowDescription::on_disk(data_id, num_receivers, &self.host, self.comm_port, file);
        self.relay_add_flow(desc).await
    }

    /// Publishes a synthetic `FAKE` flow of `size` bytes.
    pub async fn put_fake(
        &self,
        flow_id: FlowId,
        coflow_id: CoflowId,
        size: u64,
        num_receivers: u32,
    ) -> Result<()> {
        self.require_connected()?;
        let data_id = DataIdentifier::new(coflow_id, flow_id);
        let desc = FlowDescription::fake(data_id, size, num_receivers, &self.host, self.comm_port);
        self.relay_add_flow(desc).await
    }

    pub(crate) async fn relay_add_flow(&self, desc: FlowDescription) -> Result<()> {
        let payload = encode(&AddFlowMsg { desc });
        self.agent
            .call_one_way(Tag::AddFlow, payload)
            .await
            .map_err(|e| VarysError::Connectivity(e.to_string()))
    }
}
