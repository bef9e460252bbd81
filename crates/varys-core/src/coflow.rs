//! Coflow records: the user-visible grouping of related flows.

use crate::flow::FlowDescription;
use crate::ids::{ClientId, CoflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User-supplied metadata at registration time, stored verbatim by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoflowDescription {
    /// Human-readable name for the coflow.
    pub name: String,
    /// Scheduling priority hint; higher means more urgent. Not interpreted by the core.
    pub priority_hint: i32,
    /// Expected total size across all flows, in bytes. Advisory.
    pub expected_size_bytes: u64,
    /// Deadline hint as a Unix timestamp in seconds. Advisory.
    pub deadline_hint_secs: Option<u64>,
}

/// Lifecycle state of a coflow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoflowState {
    /// Just registered; no flows have necessarily been added yet.
    Registered,
    /// At least one flow has been added and not all flows are finished.
    Running,
    /// Every flow has been received by its expected number of receivers.
    Finished,
}

/// Per-flow bookkeeping the coordinator keeps beyond the wire-visible descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    /// The flow's descriptor as published by its owner.
    pub desc: FlowDescription,
    /// Count of distinct `GetFlow` calls this flow has satisfied so far.
    pub received_count: u32,
}

impl FlowEntry {
    /// Wraps a freshly-added flow descriptor with a zero receive count.
    pub fn new(desc: FlowDescription) -> Self {
        Self { desc, received_count: 0 }
    }

    /// True once `received_count` has reached the flow's expected fan-out.
    pub fn is_complete(&self) -> bool {
        self.received_count >= self.desc.num_receivers
    }
}

/// Coordinator-internal record for a registered coflow and its flows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoflowInfo {
    /// This coflow's id.
    pub coflow_id: CoflowId,
    /// The client that registered this coflow; unregistering that client cascades here.
    pub owner_client_id: ClientId,
    /// User-supplied metadata, stored verbatim.
    pub desc: CoflowDescription,
    /// Flows registered under this coflow, keyed by flow id.
    pub flows: HashMap<String, FlowEntry>,
    /// Current lifecycle state.
    pub state: CoflowState,
}

impl CoflowInfo {
    /// Creates a freshly registered, empty coflow.
    pub fn new(coflow_id: CoflowId, owner_client_id: ClientId, desc: CoflowDescription) -> Self {
        Self {
            coflow_id,
            owner_client_id,
            desc,
            flows: HashMap::new(),
            state: CoflowState::Registered,
        }
    }

    /// Inserts or replaces a flow and refreshes `state`.
    pub fn add_flow(&mut self, flow_id: crate::ids::FlowId, desc: FlowDescription) {
        self.flows.insert(flow_id.as_str().to_string(), FlowEntry::new(desc));
        self.refresh_state();
    }

    /// Removes a flow and refreshes `state`. No-op if unknown.
    pub fn remove_flow(&mut self, flow_id: &crate::ids::FlowId) {
        self.flows.remove(flow_id.as_str());
        self.refresh_state();
    }

    /// Records one more receiver finishing `flow_id`'s transfer and refreshes `state`.
    pub fn record_receipt(&mut self, flow_id: &crate::ids::FlowId) {
        if let Some(entry) = self.flows.get_mut(flow_id.as_str()) {
            entry.received_count += 1;
        }
        self.refresh_state();
    }

    /// Recomputes `state` from the current flow set: FINISHED iff every flow is complete
    /// and at least one flow exists; RUNNING if any flow exists but isn't all complete;
    /// otherwise left at REGISTERED.
    pub fn refresh_state(&mut self) {
        if self.flows.is_empty() {
            if self.state == CoflowState::Finished {
                self.state = CoflowState::Running;
            }
            return;
        }
        if self.flows.values().all(FlowEntry::is_complete) {
            self.state = CoflowState::Finished;
        } else {
            self.state = CoflowState::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowDescription;
    use crate::ids::{CoflowId, FlowId};

    fn desc(num_receivers: u32) -> FlowDescription {
        FlowDescription::fake(
            DataIdentifier::new(CoflowId::new("cf1"), FlowId::new("f1")),
            1024,
            num_receivers,
            "h1",
            9000,
        )
    }

    use crate::ids::DataIdentifier;

    #[test]
    fn becomes_finished_once_every_flow_hits_its_fan_out() {
        let mut info = CoflowInfo::new(
            CoflowId::new("cf1"),
            ClientId::new("c1"),
            CoflowDescription::default(),
        );
        let mut entry = FlowEntry::new(desc(2));
        entry.received_count = 1;
        info.flows.insert("f1".into(), entry);
        info.refresh_state();
        assert_eq!(info.state, CoflowState::Running);

        info.flows.get_mut("f1").unwrap().received_count = 2;
        info.refresh_state();
        assert_eq!(info.state, CoflowState::Finished);
    }
}
