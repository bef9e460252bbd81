//! Live-connection registry.
//!
//! The coordinator needs to push unsolicited messages (`UpdatedRates`,
//! `UnregisterCoflow` notifications to an owning agent) over a connection
//! that was originally opened *to* it by a client or agent. This registry
//! remembers which open [`TcpConnection`] belongs to which peer id, and the
//! reverse mapping needed to identify a peer whose socket just closed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use varys_core::{ClientId, SlaveId};
use varys_transport::TcpConnection;

/// Which kind of peer owned a connection that just disconnected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerKind {
    /// The connection belonged to a registered client.
    Client(ClientId),
    /// The connection belonged to a registered agent.
    Agent(SlaveId),
}

fn conn_key(conn: &Arc<TcpConnection>) -> usize {
    Arc::as_ptr(conn) as usize
}

/// Maps peer ids to their live connection, in both directions.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ClientId, Arc<TcpConnection>>>,
    agents: RwLock<HashMap<SlaveId, Arc<TcpConnection>>>,
    client_by_conn: RwLock<HashMap<usize, ClientId>>,
    agent_by_conn: RwLock<HashMap<usize, SlaveId>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `client_id` with the connection it registered on.
    pub fn register_client(&self, client_id: ClientId, conn: Arc<TcpConnection>) {
        self.client_by_conn.write().unwrap().insert(conn_key(&conn), client_id.clone());
        self.clients.write().unwrap().insert(client_id, conn);
    }

    /// Associates `slave_id` with the connection it registered on.
    pub fn register_agent(&self, slave_id: SlaveId, conn: Arc<TcpConnection>) {
        self.agent_by_conn.write().unwrap().insert(conn_key(&conn), slave_id.clone());
        self.agents.write().unwrap().insert(slave_id, conn);
    }

    /// The live connection to push messages to `client_id` over, if any.
    pub fn client_conn(&self, client_id: &ClientId) -> Option<Arc<TcpConnection>> {
        self.clients.read().unwrap().get(client_id).cloned()
    }

    /// The live connection to push messages to `slave_id` over, if any.
    pub fn agent_conn(&self, slave_id: &SlaveId) -> Option<Arc<TcpConnection>> {
        self.agents.read().unwrap().get(slave_id).cloned()
    }

    /// Removes every trace of `conn`, returning which peer (if any) owned it.
    /// Called when a connection's read loop observes EOF or an I/O error.
    pub fn remove_by_conn(&self, conn: &Arc<TcpConnection>) -> Option<PeerKind> {
        let key = conn_key(conn);
        if let Some(client_id) = self.client_by_conn.write().unwrap().remove(&key) {
            self.clients.write().unwrap().remove(&client_id);
            return Some(PeerKind::Client(client_id));
        }
        if let Some(slave_id) = self.agent_by_conn.write().unwrap().remove(&key) {
            self.agents.write().unwrap().remove(&slave_id);
            return Some(PeerKind::Agent(slave_id));
        }
        None
    }
}
