//! Per-tag message handling: decodes a frame's payload, mutates the catalog
//! or membership table, and returns whatever reply (if any) is owed.

use std::sync::Arc;

use tracing::{info, warn};
use varys_transport::{Frame, Reply, Tag, TcpConnection};

use varys_core::ids::DataIdentifier;
use varys_core::messages::{
    AddFlowMsg, BestMachinesReply, DeleteFlowMsg, GetFlowReq, GotFlowDescReply, HeartbeatMsg,
    RankedMachine, RegisterClientReply, RegisterClientReq, RegisterCoflowReq, RegisterSlaveReply,
    RegisterSlaveReq, RegisteredCoflowReply, RequestBestMachinesReq, RequestSlaveStateReq,
    SlaveStateReply, UnregisterCoflowMsg,
};
use varys_core::{AgentRecord, ClientId, CoflowId, Timestamp};

use crate::catalog::Catalog;
use crate::config::CoordinatorConfig;
use crate::connections::{ConnectionRegistry, PeerKind};
use crate::membership::Membership;
use crate::ranking::{self, Direction};

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Option<T> {
    bincode::deserialize(payload).ok()
}

/// All coordinator-owned state a connection handler needs.
pub struct CoordinatorState {
    /// The flow/coflow catalog.
    pub catalog: Catalog,
    /// The client/agent membership table.
    pub membership: Membership,
    /// The live-connection registry, for pushing unsolicited messages.
    pub connections: ConnectionRegistry,
    /// The injected rate-allocation policy.
    pub policy: crate::policy::SharedPolicy,
    /// Tunables.
    pub config: CoordinatorConfig,
}

impl CoordinatorState {
    /// Creates fresh, empty coordinator state.
    pub fn new(policy: crate::policy::SharedPolicy, config: CoordinatorConfig) -> Self {
        Self {
            catalog: Catalog::new(),
            membership: Membership::new(),
            connections: ConnectionRegistry::new(),
            policy,
            config,
        }
    }

    /// Dispatches one inbound frame, mutating state as needed.
    pub async fn handle_frame(&self, conn: &Arc<TcpConnection>, frame: Frame) -> Reply {
        match frame.tag() {
            Tag::RegisterSlave => self.handle_register_slave(conn, &frame),
            Tag::RegisterClient => self.handle_register_client(conn, &frame),
            Tag::Heartbeat => {
                self.handle_heartbeat(&frame);
                Reply::None
            }
            Tag::RegisterCoflow => self.handle_register_coflow(&frame),
            Tag::UnregisterCoflow => {
                self.handle_unregister_coflow(&frame);
                Reply::None
            }
            Tag::AddFlow => {
                self.handle_add_flow(&frame);
                Reply::None
            }
            Tag::GetFlow => self.handle_get_flow(&frame),
            Tag::DeleteFlow => {
                self.handle_delete_flow(&frame);
                Reply::None
            }
            Tag::RequestBestRxMachines => self.handle_best_machines(&frame, Direction::Rx),
            Tag::RequestBestTxMachines => self.handle_best_machines(&frame, Direction::Tx),
            Tag::RequestSlaveState => self.handle_slave_state(&frame),
            Tag::StopClient => Reply::None,
            other => {
                warn!(tag = ?other, "coordinator received a reply-only or unexpected tag");
                Reply::None
            }
        }
    }

    fn handle_register_slave(&self, conn: &Arc<TcpConnection>, frame: &Frame) -> Reply {
        let Some(req) = decode::<RegisterSlaveReq>(&frame.payload) else {
            return Reply::Message(
                Tag::RegisterSlaveFailed,
                encode(&RegisterSlaveReply::Failed { message: "malformed payload".into() }),
            );
        };
        let record = AgentRecord {
            slave_id: req.slave_id.clone(),
            host: req.host,
            port: req.port,
            web_ui_port: req.web_ui_port,
            comm_port: req.comm_port,
            public_host: req.public_host,
            last_rx_bps: 0.0,
            last_tx_bps: 0.0,
            last_heartbeat_at: Timestamp::now(),
        };
        match self.membership.register_agent(record) {
            Ok(()) => {
                self.connections.register_agent(req.slave_id.clone(), conn.clone());
                info!(slave_id = %req.slave_id, "agent registered");
                Reply::Message(
                    Tag::RegisteredSlave,
                    encode(&RegisterSlaveReply::Registered { web_ui_port: req.web_ui_port }),
                )
            }
            Err(e) => Reply::Message(
                Tag::RegisterSlaveFailed,
                encode(&RegisterSlaveReply::Failed { message: e.to_string() }),
            ),
        }
    }

    fn handle_register_client(&self, conn: &Arc<TcpConnection>, frame: &Frame) -> Reply {
        let Some(req) = decode::<RegisterClientReq>(&frame.payload) else {
            return Reply::Message(
                Tag::RegisteredClient,
                encode(&RegisterClientReply::Failed { message: "malformed payload".into() }),
            );
        };
        let client_id = ClientId::new(uuid::Uuid::new_v4().to_string());
        match self.membership.register_client(client_id.clone(), req.name, req.host, req.comm_port) {
            Ok(record) => {
                self.connections.register_client(client_id.clone(), conn.clone());
                let slave_url = self
                    .membership
                    .agent(&record.slave_id)
                    .map(|a| format!("varys://{}:{}", a.advertised_host(), a.comm_port))
                    .unwrap_or_default();
                info!(client_id = %client_id, slave_id = %record.slave_id, "client registered");
                Reply::Message(
                    Tag::RegisteredClient,
                    encode(&RegisterClientReply::Registered {
                        client_id,
                        slave_id: record.slave_id,
                        slave_url,
                    }),
                )
            }
            Err(e) => Reply::Message(
                Tag::RegisteredClient,
                encode(&RegisterClientReply::Failed { message: e.to_string() }),
            ),
        }
    }

    fn handle_heartbeat(&self, frame: &Frame) {
        if let Some(req) = decode::<HeartbeatMsg>(&frame.payload) {
            self.membership.record_heartbeat(&req.slave_id, req.rx_bps, req.tx_bps);
        }
    }

    fn handle_register_coflow(&self, frame: &Frame) -> Reply {
        let Some(req) = decode::<RegisterCoflowReq>(&frame.payload) else {
            return Reply::None;
        };
        let coflow_id = CoflowId::new(uuid::Uuid::new_v4().to_string());
        self.catalog.register_coflow(coflow_id.clone(), req.client_id, req.desc);
        Reply::Message(Tag::RegisteredCoflow, encode(&RegisteredCoflowReply { coflow_id }))
    }

    fn handle_unregister_coflow(&self, frame: &Frame) {
        if let Some(req) = decode::<UnregisterCoflowMsg>(&frame.payload) {
            self.catalog.unregister_coflow(&req.coflow_id);
        }
    }

    fn handle_add_flow(&self, frame: &Frame) {
        if let Some(req) = decode::<AddFlowMsg>(&frame.payload) {
            let coflow_id = req.desc.data_id.coflow_id.clone();
            let flow_id = req.desc.data_id.flow_id.clone();
            self.catalog.add_flow(&coflow_id, flow_id, req.desc);
        }
    }

    fn handle_get_flow(&self, frame: &Frame) -> Reply {
        let Some(req) = decode::<GetFlowReq>(&frame.payload) else {
            return Reply::Message(Tag::GotFlowDesc, encode(&GotFlowDescReply(None)));
        };
        let found = self.catalog.get_flow_and_record_receipt(&req.coflow_id, &req.flow_id, &req.client_id);
        Reply::Message(Tag::GotFlowDesc, encode(&GotFlowDescReply(found)))
    }

    fn handle_delete_flow(&self, frame: &Frame) {
        if let Some(req) = decode::<DeleteFlowMsg>(&frame.payload) {
            self.catalog.delete_flow(&req.coflow_id, &req.flow_id);
        }
    }

    fn handle_best_machines(&self, frame: &Frame, direction: Direction) -> Reply {
        let reply_tag = match direction {
            Direction::Rx => Tag::BestRxMachines,
            Direction::Tx => Tag::BestTxMachines,
        };
        let Some(req) = decode::<RequestBestMachinesReq>(&frame.payload) else {
            return Reply::Message(reply_tag, encode(&BestMachinesReply { hosts: vec![] }));
        };
        let agents = self.membership.all_agents();
        let best = ranking::best_machines(
            &agents,
            direction,
            req.n,
            req.adjust_bytes,
            self.config.allocation_interval,
            self.config.heartbeat_interval,
            Timestamp::now(),
        );
        let hosts = best
            .into_iter()
            .map(|a| RankedMachine { slave_id: a.slave_id, host: a.advertised_host().to_string() })
            .collect();
        Reply::Message(reply_tag, encode(&BestMachinesReply { hosts }))
    }

    fn handle_slave_state(&self, frame: &Frame) -> Reply {
        let Some(req) = decode::<RequestSlaveStateReq>(&frame.payload) else {
            return Reply::Message(Tag::SlaveState, encode(&SlaveStateReply(None)));
        };
        let record = self.membership.agent(&req.slave_id);
        Reply::Message(Tag::SlaveState, encode(&SlaveStateReply(record)))
    }

    /// Handles the loss of a connection: looks up which peer owned it and
    /// cascades removal per the catalog invariants.
    pub async fn handle_disconnect(&self, conn: &Arc<TcpConnection>) {
        match self.connections.remove_by_conn(conn) {
            Some(PeerKind::Client(client_id)) => {
                warn!(client_id = %client_id, "client disconnected, cascading unregister");
                self.membership.remove_client(&client_id);
                let dead_coflows = self.catalog.unregister_coflows_owned_by(&client_id);
                for coflow_id in dead_coflows {
                    self.catalog.unregister_coflow(&coflow_id);
                }
            }
            Some(PeerKind::Agent(slave_id)) => {
                warn!(slave_id = %slave_id, "agent disconnected");
                self.membership.remove_agent(&slave_id);
            }
            None => {}
        }
    }

    /// One round of the periodic rate-allocation dispatch: runs the policy
    /// over a catalog snapshot and pushes `UpdatedRates` to every client with
    /// an active `get` on a throttled flow.
    pub async fn dispatch_rate_updates(&self) {
        let flows = self.catalog.snapshot_flows();
        let allocations = self.policy.allocate(&flows);
        if allocations.is_empty() {
            return;
        }

        use std::collections::HashMap;
        let mut per_client: HashMap<ClientId, Vec<varys_core::FlowRate>> = HashMap::new();
        for flow in &flows {
            let Some(&bps) = allocations.get(&flow.data_id) else { continue };
            if bps == 0 {
                continue;
            }
            let data_id = DataIdentifier::new(flow.data_id.coflow_id.clone(), flow.data_id.flow_id.clone());
            for client_id in self.catalog.receivers_for(&data_id) {
                per_client
                    .entry(client_id)
                    .or_default()
                    .push(varys_core::FlowRate { desc: flow.clone(), bps });
            }
        }

        for (client_id, rates) in per_client {
            let Some(conn) = self.connections.client_conn(&client_id) else { continue };
            let payload = encode(&varys_core::UpdatedRatesMsg { rates });
            let frame = Frame::new(Tag::UpdatedRates, 0, payload);
            if let Err(e) = conn.send_frame(&frame).await {
                warn!(client_id = %client_id, error = %e, "failed to push rate update");
            }
        }
    }
}
