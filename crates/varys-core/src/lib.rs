#![warn(missing_docs)]

//! Varys shared data model: identifiers, flow/coflow records, and the error
//! taxonomy used by the coordinator, host agent, and client library.

/// Coflow descriptions, coordinator-internal coflow records, and lifecycle state.
pub mod coflow;
/// Shared error taxonomy (see the design's error-handling section).
pub mod error;
/// Flow descriptors and the data types they can carry.
pub mod flow;
/// Opaque identifiers and timestamps.
pub mod ids;
/// Control-plane message payloads carried over the transport's tagged frames.
pub mod messages;
/// Client and agent membership records.
pub mod registry;

pub use coflow::{CoflowDescription, CoflowInfo, CoflowState, FlowEntry};
pub use error::{Result, VarysError};
pub use flow::{DataType, FileLocation, FlowDescription};
pub use ids::{ClientId, CoflowId, DataIdentifier, FlowId, SlaveId, Timestamp};
pub use messages::{
    AddFlowMsg, BestMachinesReply, DeleteFlowMsg, FlowRate, GetFlowReq, GetRequest,
    GotFlowDescReply, HeartbeatMsg, RankedMachine, RegisterClientReply, RegisterClientReq,
    RegisterCoflowReq, RegisterSlaveReply, RegisterSlaveReq, RegisteredCoflowReply,
    RequestBestMachinesReq, RequestSlaveStateReq, SlaveStateReply, StopClientMsg,
    UnregisterCoflowMsg, UpdatedRatesMsg,
};
pub use registry::{AgentRecord, ClientRecord};
