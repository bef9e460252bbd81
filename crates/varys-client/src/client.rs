//! The client library's core: connection setup, registration, and the
//! blocking-ask operations (`registerCoflow`, `unregisterCoflow`, best-host
//! ranking, `stop`). `put*`/`get*` live in [`crate::put`]/[`crate::get`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;
use varys_core::{
    BestMachinesReply, ClientId, CoflowDescription, CoflowId, DataIdentifier, FlowId, FlowRate,
    RegisterClientReply, RegisterClientReq, RegisterCoflowReq, RegisteredCoflowReply, Result,
    SlaveId, StopClientMsg, UnregisterCoflowMsg, UpdatedRatesMsg, VarysError,
};
use varys_transport::{
    Frame, RpcClient, RpcClientConfig, Tag, TcpTransport, TcpTransportConfig, TokenBucket,
};

use crate::coordinator_link::{CoordinatorLink, DEFAULT_ASK_TIMEOUT_MS};
use crate::dataserver;

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload).map_err(|e| VarysError::Protocol(e.to_string()))
}

/// The client library's handle: one per process, registered with exactly one
/// coordinator through exactly one local agent.
pub struct Client {
    pub(crate) client_id: ClientId,
    pub(crate) slave_id: SlaveId,
    pub(crate) host: String,
    pub(crate) comm_port: u16,
    pub(crate) coordinator: CoordinatorLink,
    pub(crate) agent: RpcClient,
    pub(crate) flow_to_rate: Arc<Mutex<HashMap<DataIdentifier, u64>>>,
    pub(crate) flow_to_throttle: Arc<Mutex<HashMap<DataIdentifier, Arc<TokenBucket>>>>,
    pub(crate) flow_to_object: dataserver::ObjectTable,
    disconnected: AtomicBool,
}

fn parse_varys_url(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("varys://")
        .ok_or_else(|| VarysError::Configuration(format!("invalid peer url: {url}")))?;
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| VarysError::Configuration(format!("invalid peer url: {url}")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| VarysError::Configuration(format!("invalid peer url: {url}")))?;
    Ok((host.to_string(), port))
}

impl Client {
    /// Connects to the coordinator at `coordinator_addr`, registers under
    /// `name`, and dials the local agent the coordinator bound this client
    /// to. Registration is a synchronous barrier: this never returns until
    /// `RegisteredClient` arrives (or registration fails).
    pub async fn connect(
        name: impl Into<String>,
        host: impl Into<String>,
        comm_port: u16,
        coordinator_addr: &str,
    ) -> Result<Arc<Client>> {
        let host = host.into();
        let transport = TcpTransport::new(TcpTransportConfig::default());
        let conn = transport
            .connect(coordinator_addr)
            .await
            .map_err(|e| VarysError::Connectivity(format!("dialing coordinator: {e}")))?;
        let conn = Arc::new(conn);

        let flow_to_rate: Arc<Mutex<HashMap<DataIdentifier, u64>>> = Arc::new(Mutex::new(HashMap::new()));
        let flow_to_throttle: Arc<Mutex<HashMap<DataIdentifier, Arc<TokenBucket>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let rate_table = flow_to_rate.clone();
        let throttle_table = flow_to_throttle.clone();
        let coordinator = CoordinatorLink::new(conn, DEFAULT_ASK_TIMEOUT_MS, move |frame: Frame| {
            if frame.tag() != Tag::UpdatedRates {
                return;
            }
            let Ok(msg) = bincode::deserialize::<UpdatedRatesMsg>(&frame.payload) else {
                warn!("malformed UpdatedRates push from coordinator");
                return;
            };
            apply_rate_update(rate_table.clone(), throttle_table.clone(), msg);
        });

        let req = RegisterClientReq { name: name.into(), host: host.clone(), comm_port };
        let reply = coordinator.ask(Tag::RegisterClient, encode(&req)).await?;
        let (client_id, slave_id, slave_url) = match decode::<RegisterClientReply>(&reply.payload)? {
            RegisterClientReply::Registered { client_id, slave_id, slave_url } => {
                (client_id, slave_id, slave_url)
            }
            RegisterClientReply::Failed { message } => return Err(VarysError::Configuration(message)),
        };

        let (agent_host, agent_port) = parse_varys_url(&slave_url)?;
        let agent_transport = TcpTransport::new(TcpTransportConfig::default());
        let agent_conn = agent_transport
            .connect(&format!("{agent_host}:{agent_port}"))
            .await
            .map_err(|e| VarysError::Connectivity(format!("dialing local agent: {e}")))?;
        let agent = RpcClient::new(Arc::new(agent_conn), RpcClientConfig::default());

        let flow_to_object: dataserver::ObjectTable = Arc::new(Mutex::new(HashMap::new()));
        let objects = flow_to_object.clone();
        tokio::spawn(async move {
            if let Err(e) = dataserver::run(comm_port, objects).await {
                warn!(error = %e, "client data server exited");
            }
        });

        Ok(Arc::new(Client {
            client_id,
            slave_id,
            host,
            comm_port,
            coordinator,
            agent,
            flow_to_rate,
            flow_to_throttle,
            flow_to_object,
            disconnected: AtomicBool::new(false),
        }))
    }

    pub(crate) fn require_connected(&self) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(VarysError::Connectivity("client is disconnected".into()));
        }
        Ok(())
    }

    /// Registers a coflow with the coordinator and informs the local agent
    /// of its existence (the agent does not track coflow state itself).
    pub async fn register_coflow(&self, desc: CoflowDescription) -> Result<CoflowId> {
        self.require_connected()?;
        let req = RegisterCoflowReq { client_id: self.client_id.clone(), desc };
        let reply = self.coordinator.ask(Tag::RegisterCoflow, encode(&req)).await?;
        let RegisteredCoflowReply { coflow_id } = decode(&reply.payload)?;
        let _ = self.agent.call_one_way(Tag::RegisterCoflow, Vec::new()).await;
        Ok(coflow_id)
    }

    /// Tells the coordinator and the local agent to forget `coflow_id`, and
    /// purges every local table entry belonging to it.
    pub async fn unregister_coflow(&self, coflow_id: CoflowId) -> Result<()> {
        self.require_connected()?;
        let msg = UnregisterCoflowMsg { coflow_id: coflow_id.clone() };
        let _ = self.coordinator.tell(Tag::UnregisterCoflow, encode(&msg)).await;
        let _ = self.agent.call_one_way(Tag::UnregisterCoflow, encode(&msg)).await;

        let mut rates = self.flow_to_rate.lock().await;
        rates.retain(|id, _| id.coflow_id != coflow_id);
        drop(rates);
        let mut throttles = self.flow_to_throttle.lock().await;
        throttles.retain(|id, _| id.coflow_id != coflow_id);
        drop(throttles);
        let mut objects = self.flow_to_object.lock().await;
        objects.retain(|id, _| id.coflow_id != coflow_id);
        Ok(())
    }

    /// Fire-and-forget notification to the local agent that a flow is gone.
    pub async fn delete_flow(&self, flow_id: FlowId, coflow_id: CoflowId) -> Result<()> {
        self.require_connected()?;
        let msg = varys_core::DeleteFlowMsg { flow_id, coflow_id };
        self.agent
            .call_one_way(Tag::DeleteFlow, encode(&msg))
            .await
            .map_err(|e| VarysError::Connectivity(e.to_string()))
    }

    /// The `n` best hosts to receive data on, biased by `adjust_bytes`.
    pub async fn best_rx_machines(&self, n: u32, adjust_bytes: i64) -> Result<Vec<String>> {
        self.best_machines(Tag::RequestBestRxMachines, n, adjust_bytes).await
    }

    /// The `n` best hosts to send data from, biased by `adjust_bytes`.
    pub async fn best_tx_machines(&self, n: u32, adjust_bytes: i64) -> Result<Vec<String>> {
        self.best_machines(Tag::RequestBestTxMachines, n, adjust_bytes).await
    }

    async fn best_machines(&self, tag: Tag, n: u32, adjust_bytes: i64) -> Result<Vec<String>> {
        self.require_connected()?;
        let req = varys_core::RequestBestMachinesReq { n, adjust_bytes };
        let reply = self.coordinator.ask(tag, encode(&req)).await?;
        let BestMachinesReply { hosts } = decode(&reply.payload)?;
        Ok(hosts.into_iter().map(|h| h.host).collect())
    }

    /// Issues `StopClient` to the coordinator and marks this client
    /// disconnected; any failure to deliver the notification is swallowed.
    pub async fn stop(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        let _ = self.coordinator.tell(Tag::StopClient, encode(&StopClientMsg)).await;
    }
}

fn apply_rate_update(
    rate_table: Arc<Mutex<HashMap<DataIdentifier, u64>>>,
    throttle_table: Arc<Mutex<HashMap<DataIdentifier, Arc<TokenBucket>>>>,
    msg: UpdatedRatesMsg,
) {
    tokio::spawn(async move {
        let mut rates = rate_table.lock().await;
        let throttles = throttle_table.lock().await;
        for FlowRate { desc, bps } in msg.rates {
            rates.insert(desc.data_id.clone(), bps);
            if let Some(bucket) = throttles.get(&desc.data_id) {
                bucket.set_new_rate(bps);
            }
        }
    });
}
