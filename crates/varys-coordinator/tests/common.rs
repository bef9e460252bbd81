//! Shared test harness: a real coordinator bound to an ephemeral loopback
//! port, with helpers to connect real `RpcClient` sockets against it and to
//! drive the register/heartbeat/coflow handshake each test needs.

use std::sync::Arc;
use std::time::Duration;

use varys_core::messages::{
    GetFlowReq, GotFlowDescReply, RegisterClientReply, RegisterClientReq, RegisterCoflowReq,
    RegisterSlaveReply, RegisterSlaveReq, RegisteredCoflowReply,
};
use varys_core::{ClientId, CoflowDescription, CoflowId, SlaveId};
use varys_coordinator::{CoordinatorConfig, CoordinatorState, IdentityPolicy, SharedPolicy};
use varys_transport::{Frame, RpcClient, RpcClientConfig, Tag, TcpConnection, TcpTransport, TcpTransportConfig};

/// A coordinator bound to an ephemeral port and its periodic dispatch loop,
/// both running for the duration of one test.
pub struct TestCoordinator {
    pub addr: String,
}

impl TestCoordinator {
    /// Starts a coordinator with a fast heartbeat/allocation interval so
    /// tests don't have to wait out the production defaults.
    pub async fn start() -> Self {
        Self::with_heartbeat(Duration::from_millis(50)).await
    }

    /// Starts a coordinator with an explicit heartbeat interval, for tests
    /// that exercise liveness expiry.
    pub async fn with_heartbeat(heartbeat_interval: Duration) -> Self {
        Self::with_policy(heartbeat_interval, Arc::new(IdentityPolicy)).await
    }

    /// Starts a coordinator with an explicit heartbeat interval and
    /// rate-allocation policy, for tests that exercise the dispatch push.
    pub async fn with_policy(heartbeat_interval: Duration, policy: SharedPolicy) -> Self {
        let config = CoordinatorConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            heartbeat_interval,
            allocation_interval: heartbeat_interval,
        };
        let state = Arc::new(CoordinatorState::new(policy, config));

        let (listener, addr) = varys_coordinator::server::bind("127.0.0.1:0").await.unwrap();
        let serve_state = state.clone();
        tokio::spawn(async move {
            varys_coordinator::server::serve_accepted(serve_state, listener).await.ok();
        });
        let dispatch_state = state.clone();
        tokio::spawn(async move {
            varys_coordinator::server::run_dispatch_loop(dispatch_state).await;
        });

        Self { addr: addr.to_string() }
    }

    /// Opens a fresh control-plane connection to this coordinator.
    pub async fn connect(&self) -> RpcClient {
        RpcClient::new(self.connect_raw().await, RpcClientConfig::default())
    }

    /// Opens a fresh, un-multiplexed connection. `RpcClient` drops frames
    /// whose `request_id` doesn't match a pending `call`, which silently
    /// eats unsolicited pushes like `UpdatedRates` — tests that need to
    /// observe one connect raw instead.
    pub async fn connect_raw(&self) -> Arc<TcpConnection> {
        let transport = TcpTransport::new(TcpTransportConfig::default());
        Arc::new(transport.connect(&self.addr).await.unwrap())
    }
}

/// Sends a request over a raw connection and waits for the matching reply,
/// ignoring any unsolicited frames that arrive first.
pub async fn ask_raw(conn: &TcpConnection, tag: Tag, request_id: u64, payload: Vec<u8>) -> Frame {
    conn.send_frame(&Frame::new(tag, request_id, payload)).await.unwrap();
    loop {
        let frame = conn.recv_frame().await.unwrap();
        if frame.request_id() == request_id {
            return frame;
        }
    }
}

/// Registers an agent over `client` and returns its chosen id.
pub async fn register_agent(client: &RpcClient, slave_id: &str, host: &str, port: u16) -> SlaveId {
    let req = RegisterSlaveReq {
        slave_id: SlaveId::new(slave_id),
        host: host.to_string(),
        port,
        web_ui_port: port + 1,
        comm_port: port + 2,
        public_host: None,
    };
    let payload = bincode::serialize(&req).unwrap();
    let reply = client.call(Tag::RegisterSlave, payload).await.unwrap();
    match bincode::deserialize::<RegisterSlaveReply>(&reply.payload).unwrap() {
        RegisterSlaveReply::Registered { .. } => SlaveId::new(slave_id),
        RegisterSlaveReply::Failed { message } => panic!("agent registration failed: {message}"),
    }
}

/// Registers a client over `client` (bound to the given host, which must
/// match a previously registered agent's host) and returns its allocated id.
pub async fn register_client(client: &RpcClient, name: &str, host: &str, comm_port: u16) -> ClientId {
    let req = RegisterClientReq { name: name.to_string(), host: host.to_string(), comm_port };
    let payload = bincode::serialize(&req).unwrap();
    let reply = client.call(Tag::RegisterClient, payload).await.unwrap();
    match bincode::deserialize::<RegisterClientReply>(&reply.payload).unwrap() {
        RegisterClientReply::Registered { client_id, .. } => client_id,
        RegisterClientReply::Failed { message } => panic!("client registration failed: {message}"),
    }
}

/// Registers a coflow owned by `client_id` and returns its allocated id.
pub async fn register_coflow(client: &RpcClient, client_id: ClientId) -> CoflowId {
    let req = RegisterCoflowReq { client_id, desc: CoflowDescription::default() };
    let payload = bincode::serialize(&req).unwrap();
    let reply = client.call(Tag::RegisterCoflow, payload).await.unwrap();
    let reply: RegisteredCoflowReply = bincode::deserialize(&reply.payload).unwrap();
    reply.coflow_id
}

/// Performs a `GetFlow` ask and returns the decoded reply.
pub async fn get_flow(client: &RpcClient, req: GetFlowReq) -> GotFlowDescReply {
    let payload = bincode::serialize(&req).unwrap();
    let reply = client.call(Tag::GetFlow, payload).await.unwrap();
    bincode::deserialize(&reply.payload).unwrap()
}
