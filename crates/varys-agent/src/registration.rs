//! Coordinator registration: dials the coordinator, sends `RegisterSlave`,
//! and hands back the live RPC connection the rest of the agent uses for
//! heartbeats and control relay.

use std::sync::Arc;

use varys_core::{RegisterSlaveReply, RegisterSlaveReq, Result, VarysError};
use varys_transport::{RpcClient, RpcClientConfig, Tag, TcpTransport, TcpTransportConfig};

use crate::config::AgentConfig;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| VarysError::Protocol(e.to_string()))
}

/// An agent that has successfully registered with the coordinator.
pub struct RegisteredAgent {
    /// This agent's own configuration.
    pub config: AgentConfig,
    /// The live RPC connection to the coordinator.
    pub rpc: RpcClient,
    /// The web UI port the coordinator echoed back at registration.
    pub web_ui_port: u16,
}

/// Connects to `config.coordinator_addr` and registers this agent. A
/// rejected or unreachable registration is fatal, per the design's
/// configuration/connectivity error taxonomy.
pub async fn register(config: AgentConfig) -> Result<RegisteredAgent> {
    let transport = TcpTransport::new(TcpTransportConfig::default());
    let conn = transport
        .connect(&config.coordinator_addr)
        .await
        .map_err(|e| VarysError::Connectivity(format!("dialing coordinator: {e}")))?;
    let rpc = RpcClient::new(Arc::new(conn), RpcClientConfig::default());

    let req = RegisterSlaveReq {
        slave_id: varys_core::SlaveId::new(config.slave_id.clone()),
        host: config.host.clone(),
        port: config.port,
        web_ui_port: config.web_ui_port,
        comm_port: config.comm_port(),
        public_host: config.public_host.clone(),
    };
    let reply = rpc
        .call(Tag::RegisterSlave, encode(&req))
        .await
        .map_err(|e| VarysError::Connectivity(format!("RegisterSlave ask failed: {e}")))?;
    match decode::<RegisterSlaveReply>(&reply.payload)? {
        RegisterSlaveReply::Registered { web_ui_port } => {
            Ok(RegisteredAgent { config, rpc, web_ui_port })
        }
        RegisterSlaveReply::Failed { message } => Err(VarysError::Configuration(message)),
    }
}
