//! Client and agent records tracked by the coordinator's membership table.

use crate::ids::{ClientId, SlaveId, Timestamp};
use serde::{Deserialize, Serialize};

/// A registered client process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// This client's id.
    pub client_id: ClientId,
    /// Display name supplied at registration.
    pub name: String,
    /// Host the client is running on; used to resolve its local agent.
    pub host: String,
    /// Port the client's own control-plane listener accepts on.
    pub comm_port: u16,
    /// The agent bound to this client (same host).
    pub slave_id: SlaveId,
}

/// A registered per-host agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// This agent's id.
    pub slave_id: SlaveId,
    /// Host the agent runs on.
    pub host: String,
    /// Agent's data-plane port.
    pub port: u16,
    /// Agent's web UI port, returned to the agent at registration (opaque to the core).
    pub web_ui_port: u16,
    /// Agent's control-plane port.
    pub comm_port: u16,
    /// Externally-advertised host name, if different from `host`.
    pub public_host: Option<String>,
    /// Most recently reported ingress bits-per-second.
    pub last_rx_bps: f64,
    /// Most recently reported egress bits-per-second.
    pub last_tx_bps: f64,
    /// Timestamp of the last accepted heartbeat.
    pub last_heartbeat_at: Timestamp,
}

impl AgentRecord {
    /// An agent is live iff it has heartbeated within `3 * heartbeat_interval`.
    pub fn is_live(&self, now: Timestamp, heartbeat_interval: std::time::Duration) -> bool {
        now.elapsed_since(&self.last_heartbeat_at) <= heartbeat_interval * 3
    }

    /// The host name clients and peers should dial: `public_host` if set, else `host`.
    pub fn advertised_host(&self) -> &str {
        self.public_host.as_deref().unwrap_or(&self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn agent_at(secs: u64) -> AgentRecord {
        AgentRecord {
            slave_id: SlaveId::new("s1"),
            host: "h1".into(),
            port: 9000,
            web_ui_port: 9001,
            comm_port: 9002,
            public_host: None,
            last_rx_bps: 0.0,
            last_tx_bps: 0.0,
            last_heartbeat_at: Timestamp { secs, nanos: 0 },
        }
    }

    #[test]
    fn liveness_window_is_three_heartbeat_intervals() {
        let interval = Duration::from_secs(1);
        let agent = agent_at(0);
        let still_live = Timestamp { secs: 3, nanos: 0 };
        let now_dead = Timestamp { secs: 4, nanos: 1 };
        assert!(agent.is_live(still_live, interval));
        assert!(!agent.is_live(now_dead, interval));
    }

    #[test]
    fn advertised_host_prefers_public_override() {
        let mut agent = agent_at(0);
        assert_eq!(agent.advertised_host(), "h1");
        agent.public_host = Some("public.example".into());
        assert_eq!(agent.advertised_host(), "public.example");
    }
}
