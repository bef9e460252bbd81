//! Coflow/flow catalog: the coordinator's in-memory record of every coflow
//! and flow registered by clients, keyed for the lookups the message handlers
//! need (by id, and by owning coflow).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use varys_core::ids::DataIdentifier;
use varys_core::{ClientId, CoflowDescription, CoflowId, CoflowInfo, FlowDescription, FlowId};

fn data_id_of(coflow_id: &CoflowId, flow_key: &str) -> DataIdentifier {
    DataIdentifier::new(coflow_id.clone(), FlowId::new(flow_key))
}

/// Thread-safe catalog of coflows and their flows.
///
/// One instance is shared by the coordinator's mailbox task and the periodic
/// rate-dispatch task; both only ever take short-lived read or write locks,
/// never hold one across an `.await`.
#[derive(Default)]
pub struct Catalog {
    coflows: RwLock<HashMap<CoflowId, CoflowInfo>>,
    /// Clients with an active `get` against each flow, populated on `GetFlow`
    /// and consulted by the periodic rate dispatcher to decide who to notify.
    receivers: RwLock<HashMap<DataIdentifier, HashSet<ClientId>>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new coflow under its owning client.
    pub fn register_coflow(&self, coflow_id: CoflowId, owner_client_id: ClientId, desc: CoflowDescription) {
        let info = CoflowInfo::new(coflow_id.clone(), owner_client_id, desc);
        self.coflows.write().unwrap().insert(coflow_id, info);
    }

    /// Removes a coflow and every flow it owns, along with their `receivers`
    /// bookkeeping. No-op if unknown.
    pub fn unregister_coflow(&self, coflow_id: &CoflowId) {
        let removed = self.coflows.write().unwrap().remove(coflow_id);
        if let Some(info) = removed {
            self.prune_receivers(coflow_id, info.flows.keys());
        }
    }

    /// Removes every coflow owned by `client_id`, and the `receivers` entries
    /// of every flow they owned. Used when a client is declared dead.
    pub fn unregister_coflows_owned_by(&self, client_id: &ClientId) -> Vec<CoflowId> {
        let mut coflows = self.coflows.write().unwrap();
        let dead: Vec<CoflowId> = coflows
            .values()
            .filter(|info| &info.owner_client_id == client_id)
            .map(|info| info.coflow_id.clone())
            .collect();
        let mut removed = Vec::new();
        for id in &dead {
            if let Some(info) = coflows.remove(id) {
                removed.push((id.clone(), info));
            }
        }
        drop(coflows);
        for (id, info) in &removed {
            self.prune_receivers(id, info.flows.keys());
        }
        dead
    }

    /// Drops every `receivers` entry for the given coflow's flow keys.
    fn prune_receivers<'a>(&self, coflow_id: &CoflowId, flow_keys: impl Iterator<Item = &'a String>) {
        let mut receivers = self.receivers.write().unwrap();
        for flow_key in flow_keys {
            receivers.remove(&data_id_of(coflow_id, flow_key));
        }
    }

    /// Inserts or replaces a flow under its coflow. Idempotent on `dataId`.
    /// No-op if the coflow is unknown (it may have raced with an unregister).
    pub fn add_flow(&self, coflow_id: &CoflowId, flow_id: FlowId, desc: FlowDescription) {
        let mut coflows = self.coflows.write().unwrap();
        if let Some(info) = coflows.get_mut(coflow_id) {
            info.add_flow(flow_id, desc);
        }
    }

    /// Removes a single flow from its coflow, re-deriving the coflow's state,
    /// and drops its `receivers` entry.
    pub fn delete_flow(&self, coflow_id: &CoflowId, flow_id: &FlowId) {
        let mut coflows = self.coflows.write().unwrap();
        if let Some(info) = coflows.get_mut(coflow_id) {
            info.remove_flow(flow_id);
        }
        drop(coflows);
        self.receivers.write().unwrap().remove(&data_id_of(coflow_id, flow_id.as_str()));
    }

    /// Looks up one flow's description, recording a receipt against its fan-out
    /// count and registering `client_id` as an interested receiver for future
    /// rate-update dispatch.
    pub fn get_flow_and_record_receipt(
        &self,
        coflow_id: &CoflowId,
        flow_id: &FlowId,
        client_id: &ClientId,
    ) -> Option<FlowDescription> {
        let mut coflows = self.coflows.write().unwrap();
        let info = coflows.get_mut(coflow_id)?;
        let desc = info.flows.get(flow_id.as_str()).map(|entry| entry.desc.clone())?;
        info.record_receipt(flow_id);
        drop(coflows);
        let data_id = DataIdentifier::new(coflow_id.clone(), flow_id.clone());
        self.receivers.write().unwrap().entry(data_id).or_default().insert(client_id.clone());
        Some(desc)
    }

    /// Every client currently known to have an active `get` against `data_id`.
    pub fn receivers_for(&self, data_id: &DataIdentifier) -> HashSet<ClientId> {
        self.receivers.read().unwrap().get(data_id).cloned().unwrap_or_default()
    }

    /// Snapshots every flow currently registered, across all coflows. Used by
    /// the rate-allocation policy, which needs a consistent full view.
    pub fn snapshot_flows(&self) -> Vec<FlowDescription> {
        let coflows = self.coflows.read().unwrap();
        coflows
            .values()
            .flat_map(|info| info.flows.values().map(|entry| entry.desc.clone()))
            .collect()
    }

    /// Returns the number of coflows currently tracked.
    pub fn coflow_count(&self) -> usize {
        self.coflows.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use varys_core::ids::DataIdentifier;

    fn cid(s: &str) -> CoflowId {
        CoflowId::new(s)
    }

    fn fid(s: &str) -> FlowId {
        FlowId::new(s)
    }

    fn fake_desc(coflow: &str, flow: &str, size: u64) -> FlowDescription {
        FlowDescription::fake(DataIdentifier::new(cid(coflow), fid(flow)), size, 1, "h1", 9000)
    }

    #[test]
    fn register_and_fetch_flow() {
        let cat = Catalog::new();
        cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 1024));

        let rx = ClientId::new("rx");
        let found = cat.get_flow_and_record_receipt(&cid("cf1"), &fid("f1"), &rx).unwrap();
        assert_eq!(found.size_in_bytes, 1024);
        let data_id = DataIdentifier::new(cid("cf1"), fid("f1"));
        assert!(cat.receivers_for(&data_id).contains(&rx));
    }

    #[test]
    fn unregister_coflow_drops_its_flows() {
        let cat = Catalog::new();
        cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 1024));
        cat.unregister_coflow(&cid("cf1"));
        assert!(cat
            .get_flow_and_record_receipt(&cid("cf1"), &fid("f1"), &ClientId::new("rx"))
            .is_none());
        assert_eq!(cat.coflow_count(), 0);
    }

    #[test]
    fn unregister_coflows_owned_by_cascades() {
        let cat = Catalog::new();
        let tx = ClientId::new("tx");
        cat.register_coflow(cid("cf1"), tx.clone(), CoflowDescription::default());
        cat.register_coflow(cid("cf2"), ClientId::new("other"), CoflowDescription::default());
        let removed = cat.unregister_coflows_owned_by(&tx);
        assert_eq!(removed, vec![cid("cf1")]);
        assert_eq!(cat.coflow_count(), 1);
    }

    #[test]
    fn snapshot_flows_spans_all_coflows() {
        let cat = Catalog::new();
        cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
        cat.register_coflow(cid("cf2"), ClientId::new("tx"), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 10));
        cat.add_flow(&cid("cf2"), fid("f2"), fake_desc("cf2", "f2", 20));
        assert_eq!(cat.snapshot_flows().len(), 2);
    }

    #[test]
    fn unregister_coflow_prunes_receivers() {
        let cat = Catalog::new();
        cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 1024));
        let rx = ClientId::new("rx");
        cat.get_flow_and_record_receipt(&cid("cf1"), &fid("f1"), &rx).unwrap();
        let data_id = DataIdentifier::new(cid("cf1"), fid("f1"));
        assert!(!cat.receivers_for(&data_id).is_empty());

        cat.unregister_coflow(&cid("cf1"));
        assert!(cat.receivers_for(&data_id).is_empty());
    }

    #[test]
    fn unregister_coflows_owned_by_prunes_receivers() {
        let cat = Catalog::new();
        let tx = ClientId::new("tx");
        cat.register_coflow(cid("cf1"), tx.clone(), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 1024));
        let rx = ClientId::new("rx");
        cat.get_flow_and_record_receipt(&cid("cf1"), &fid("f1"), &rx).unwrap();

        cat.unregister_coflows_owned_by(&tx);
        let data_id = DataIdentifier::new(cid("cf1"), fid("f1"));
        assert!(cat.receivers_for(&data_id).is_empty());
    }

    #[test]
    fn delete_flow_prunes_its_receivers_entry() {
        let cat = Catalog::new();
        cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
        cat.add_flow(&cid("cf1"), fid("f1"), fake_desc("cf1", "f1", 1024));
        let rx = ClientId::new("rx");
        cat.get_flow_and_record_receipt(&cid("cf1"), &fid("f1"), &rx).unwrap();

        cat.delete_flow(&cid("cf1"), &fid("f1"));
        let data_id = DataIdentifier::new(cid("cf1"), fid("f1"));
        assert!(cat.receivers_for(&data_id).is_empty());
    }

    proptest! {
        // Catalog invariant 3: after unregistering a coflow, no flow or
        // receivers entry bearing its coflowId remains anywhere, regardless
        // of how many flows it held or how many clients had an active `get`.
        #[test]
        fn unregister_coflow_leaves_no_trace(flow_names in prop::collection::hash_set("[a-z]{1,8}", 1..10)) {
            let cat = Catalog::new();
            cat.register_coflow(cid("cf1"), ClientId::new("tx"), CoflowDescription::default());
            for name in &flow_names {
                cat.add_flow(&cid("cf1"), fid(name), fake_desc("cf1", name, 10));
                cat.get_flow_and_record_receipt(&cid("cf1"), &fid(name), &ClientId::new("rx")).unwrap();
            }

            cat.unregister_coflow(&cid("cf1"));

            prop_assert_eq!(cat.coflow_count(), 0);
            for name in &flow_names {
                let data_id = DataIdentifier::new(cid("cf1"), fid(name));
                prop_assert!(cat.receivers_for(&data_id).is_empty());
                prop_assert!(cat
                    .get_flow_and_record_receipt(&cid("cf1"), &fid(name), &ClientId::new("other"))
                    .is_none());
            }
        }
    }
}
