//! Client and agent membership tables.
//!
//! Tracks registered clients and agents, resolves a client's local agent by
//! host match, and answers the liveness question the failure detector and
//! ranking functions both depend on.

use std::collections::HashMap;
use std::sync::RwLock;

use varys_core::{AgentRecord, ClientId, ClientRecord, SlaveId, Timestamp, VarysError};

/// Membership table shared by the coordinator's mailbox and its periodic tasks.
#[derive(Default)]
pub struct Membership {
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
    agents: RwLock<HashMap<SlaveId, AgentRecord>>,
}

impl Membership {
    /// Creates an empty membership table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new agent. Rejects a duplicate `slaveId` or a `host:port`
    /// already claimed by a different agent.
    pub fn register_agent(&self, record: AgentRecord) -> Result<(), VarysError> {
        let mut agents = self.agents.write().unwrap();
        if agents.contains_key(&record.slave_id) {
            return Err(VarysError::Configuration(format!(
                "duplicate slaveId {}",
                record.slave_id
            )));
        }
        if agents
            .values()
            .any(|a| a.host == record.host && a.port == record.port)
        {
            return Err(VarysError::Configuration(format!(
                "host:port {}:{} already registered",
                record.host, record.port
            )));
        }
        agents.insert(record.slave_id.clone(), record);
        Ok(())
    }

    /// Removes an agent. No-op if unknown.
    pub fn remove_agent(&self, slave_id: &SlaveId) {
        self.agents.write().unwrap().remove(slave_id);
    }

    /// Updates an agent's reported throughput and resets its liveness timer.
    pub fn record_heartbeat(&self, slave_id: &SlaveId, rx_bps: f64, tx_bps: f64) {
        if let Some(agent) = self.agents.write().unwrap().get_mut(slave_id) {
            agent.last_rx_bps = rx_bps;
            agent.last_tx_bps = tx_bps;
            agent.last_heartbeat_at = Timestamp::now();
        }
    }

    /// Registers a new client bound to the agent matching `host`. Fails if no
    /// agent is registered on that host.
    pub fn register_client(
        &self,
        client_id: ClientId,
        name: String,
        host: String,
        comm_port: u16,
    ) -> Result<ClientRecord, VarysError> {
        let agents = self.agents.read().unwrap();
        let agent = agents
            .values()
            .find(|a| a.host == host)
            .ok_or_else(|| VarysError::Configuration(format!("no agent registered on host {host}")))?;
        let record = ClientRecord {
            client_id: client_id.clone(),
            name,
            host,
            comm_port,
            slave_id: agent.slave_id.clone(),
        };
        drop(agents);
        self.clients.write().unwrap().insert(client_id, record.clone());
        Ok(record)
    }

    /// Removes a client. No-op if unknown.
    pub fn remove_client(&self, client_id: &ClientId) {
        self.clients.write().unwrap().remove(client_id);
    }

    /// Looks up an agent's record by id.
    pub fn agent(&self, slave_id: &SlaveId) -> Option<AgentRecord> {
        self.agents.read().unwrap().get(slave_id).cloned()
    }

    /// Looks up a client's record by id.
    pub fn client(&self, client_id: &ClientId) -> Option<ClientRecord> {
        self.clients.read().unwrap().get(client_id).cloned()
    }

    /// Snapshots every agent, live or not. Used by ranking and by the failure
    /// detector's periodic liveness sweep.
    pub fn all_agents(&self) -> Vec<AgentRecord> {
        self.agents.read().unwrap().values().cloned().collect()
    }

    /// Snapshots every registered client.
    pub fn all_clients(&self) -> Vec<ClientRecord> {
        self.clients.read().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(slave_id: &str, host: &str, port: u16) -> AgentRecord {
        AgentRecord {
            slave_id: SlaveId::new(slave_id),
            host: host.into(),
            port,
            web_ui_port: port + 1,
            comm_port: port + 2,
            public_host: None,
            last_rx_bps: 0.0,
            last_tx_bps: 0.0,
            last_heartbeat_at: Timestamp::now(),
        }
    }

    #[test]
    fn duplicate_slave_id_is_rejected() {
        let m = Membership::new();
        m.register_agent(agent("s1", "h1", 9000)).unwrap();
        let err = m.register_agent(agent("s1", "h2", 9001)).unwrap_err();
        assert!(matches!(err, VarysError::Configuration(_)));
    }

    #[test]
    fn conflicting_host_port_is_rejected() {
        let m = Membership::new();
        m.register_agent(agent("s1", "h1", 9000)).unwrap();
        let err = m.register_agent(agent("s2", "h1", 9000)).unwrap_err();
        assert!(matches!(err, VarysError::Configuration(_)));
    }

    #[test]
    fn client_binds_to_agent_on_same_host() {
        let m = Membership::new();
        m.register_agent(agent("s1", "h1", 9000)).unwrap();
        let record = m
            .register_client(ClientId::new("c1"), "app".into(), "h1".into(), 7000)
            .unwrap();
        assert_eq!(record.slave_id, SlaveId::new("s1"));
    }

    #[test]
    fn client_registration_fails_without_matching_agent() {
        let m = Membership::new();
        let err = m
            .register_client(ClientId::new("c1"), "app".into(), "nowhere".into(), 7000)
            .unwrap_err();
        assert!(matches!(err, VarysError::Configuration(_)));
    }

    #[test]
    fn heartbeat_updates_stats() {
        let m = Membership::new();
        m.register_agent(agent("s1", "h1", 9000)).unwrap();
        m.record_heartbeat(&SlaveId::new("s1"), 123.0, 456.0);
        let a = m.agent(&SlaveId::new("s1")).unwrap();
        assert_eq!(a.last_rx_bps, 123.0);
        assert_eq!(a.last_tx_bps, 456.0);
    }
}
