//! Control-plane message payloads exchanged between coordinator, agent, and
//! client. These are transport-agnostic: a role crate serializes one of these
//! with `bincode` and ships it as the payload of a tagged transport frame
//! whose tag matches the wire enumeration in the design's wire-format section.

use crate::coflow::CoflowDescription;
use crate::flow::FlowDescription;
use crate::ids::{ClientId, CoflowId, FlowId, SlaveId};
use crate::registry::AgentRecord;
use serde::{Deserialize, Serialize};

/// `RegisterSlave(id, host, port, ...)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterSlaveReq {
    /// Id the agent wants to register under.
    pub slave_id: SlaveId,
    /// Host the agent runs on.
    pub host: String,
    /// Data-plane port.
    pub port: u16,
    /// Web UI port (opaque to the core; echoed back on success).
    pub web_ui_port: u16,
    /// Control-plane port.
    pub comm_port: u16,
    /// Externally-advertised host override, if any.
    pub public_host: Option<String>,
}

/// `RegisteredSlave(webUi)` or `RegisterSlaveFailed(msg)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegisterSlaveReply {
    /// Registration accepted.
    Registered {
        /// The agent's own web UI port, echoed back.
        web_ui_port: u16,
    },
    /// Rejected: duplicate `slaveId` or a host:port conflict.
    Failed {
        /// Human-readable rejection reason.
        message: String,
    },
}

/// `RegisterClient(name, host, commPort)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterClientReq {
    /// Display name for the client.
    pub name: String,
    /// Host the client runs on; used to resolve its local agent.
    pub host: String,
    /// The client's own control-plane port.
    pub comm_port: u16,
}

/// `RegisteredClient(cid, sid, sUrl)`, or a failure when no agent matches the
/// client's host (the wire format fixes one reply tag for this request; the
/// two outcomes are distinguished by this payload's variant).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegisterClientReply {
    /// Registration accepted.
    Registered {
        /// Freshly allocated client id.
        client_id: ClientId,
        /// The agent bound to this client.
        slave_id: SlaveId,
        /// `varys://host:port` URL of the bound agent.
        slave_url: String,
    },
    /// No agent is registered on the client's host.
    Failed {
        /// Human-readable rejection reason.
        message: String,
    },
}

/// `Heartbeat(slaveId, rxBps, txBps)`. One-way; no reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatMsg {
    /// The reporting agent.
    pub slave_id: SlaveId,
    /// Windowed ingress bits-per-second since the last heartbeat.
    pub rx_bps: f64,
    /// Windowed egress bits-per-second since the last heartbeat.
    pub tx_bps: f64,
}

/// `RegisterCoflow(clientId, desc)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterCoflowReq {
    /// The registering (and owning) client.
    pub client_id: ClientId,
    /// User-supplied coflow metadata, stored verbatim.
    pub desc: CoflowDescription,
}

/// `RegisteredCoflow(cfid)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredCoflowReply {
    /// Freshly allocated coflow id.
    pub coflow_id: CoflowId,
}

/// `UnregisterCoflow(cfid)`. One-way; no reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnregisterCoflowMsg {
    /// The coflow to remove, along with every flow it owns.
    pub coflow_id: CoflowId,
}

/// `AddFlow(desc)`. One-way; no reply. Idempotent on `dataId`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddFlowMsg {
    /// The flow to insert into the catalog.
    pub desc: FlowDescription,
}

/// `GetFlow(flowId, cfid, clid, sid)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetFlowReq {
    /// The flow being requested.
    pub flow_id: FlowId,
    /// The coflow the flow belongs to.
    pub coflow_id: CoflowId,
    /// The requesting client, for receiver accounting.
    pub client_id: ClientId,
    /// The requesting client's local agent.
    pub slave_id: SlaveId,
}

/// `Some(GotFlowDesc(d))` or `None` for an unknown `(coflowId, flowId)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GotFlowDescReply(pub Option<FlowDescription>);

/// `DeleteFlow(flowId, cfid)`. One-way; sent to the local agent only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteFlowMsg {
    /// The flow to forget.
    pub flow_id: FlowId,
    /// The coflow the flow belongs to.
    pub coflow_id: CoflowId,
}

/// One flow's freshly computed rate, as carried in `UpdatedRates`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowRate {
    /// The flow this rate applies to.
    pub desc: FlowDescription,
    /// Allocated rate in bits-per-second.
    pub bps: u64,
}

/// `UpdatedRates(list<(FlowDescription, bps)>)`. Broadcast periodically; one-way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdatedRatesMsg {
    /// Every flow this client has rate information for, with its current allocation.
    pub rates: Vec<FlowRate>,
}

/// `RequestBestRxMachines(n, adjust)` / `RequestBestTxMachines(n, adjust)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestBestMachinesReq {
    /// How many hosts to return.
    pub n: u32,
    /// Bytes to add to the measured rate to account for a transfer the caller
    /// is about to initiate, normalized over the allocation interval.
    pub adjust_bytes: i64,
}

/// A single ranked host in a `BestRxMachines`/`BestTxMachines` reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankedMachine {
    /// The agent's id.
    pub slave_id: SlaveId,
    /// The agent's advertised host.
    pub host: String,
}

/// `BestRxMachines(hosts[])` / `BestTxMachines(hosts[])`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BestMachinesReply {
    /// Hosts in ascending order of the ranked metric; ties broken by `slaveId`.
    pub hosts: Vec<RankedMachine>,
}

/// `StopClient`. One-way; the client swallows failures of this ask's reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopClientMsg;

/// `RequestSlaveState`. Not part of the functional message table, but fixed in
/// the wire tag enumeration; resolved here as a read-only introspection query
/// returning the coordinator's view of one agent (used by management tooling).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestSlaveStateReq {
    /// The agent being queried.
    pub slave_id: SlaveId,
}

/// `SlaveState`: the coordinator's current record for the queried agent, if any.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlaveStateReply(pub Option<AgentRecord>);

/// Data-plane `GetRequest{ flowDesc }`, sent as the single request blob of the
/// one-shot socket protocol. Distinct from the control-plane `GetFlowReq`: this
/// one goes to whichever host serves the flow's bytes, not to the coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRequest {
    /// The flow descriptor resolved from the coordinator's catalog.
    pub flow_desc: FlowDescription,
}
