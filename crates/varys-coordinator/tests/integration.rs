//! Integration tests driving a real coordinator over real loopback TCP
//! sockets: registration, heartbeat liveness, cascading delete on client
//! disconnect, and periodic rate dispatch.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use varys_core::ids::DataIdentifier;
use varys_core::messages::{AddFlowMsg, GetFlowReq, RequestBestMachinesReq};
use varys_core::{BestMachinesReply, ClientId, FlowDescription, FlowId, SlaveId, UpdatedRatesMsg};
use varys_coordinator::FnPolicy;
use varys_transport::Tag;

use common::{ask_raw, get_flow, register_agent, register_client, register_coflow, TestCoordinator};

#[tokio::test]
async fn agent_and_client_registration_round_trips() {
    let coord = TestCoordinator::start().await;
    let agent_conn = coord.connect().await;
    register_agent(&agent_conn, "s1", "host-a", 9000).await;

    let client_conn = coord.connect().await;
    let client_id = register_client(&client_conn, "alice", "host-a", 9100).await;
    assert!(!client_id.as_str().is_empty());
}

#[tokio::test]
async fn client_registration_fails_without_a_matching_agent() {
    let coord = TestCoordinator::start().await;
    let client_conn = coord.connect().await;

    let req = varys_core::messages::RegisterClientReq {
        name: "bob".into(),
        host: "no-such-host".into(),
        comm_port: 9100,
    };
    let payload = bincode::serialize(&req).unwrap();
    let reply = client_conn.call(Tag::RegisterClient, payload).await.unwrap();
    let reply: varys_core::messages::RegisterClientReply = bincode::deserialize(&reply.payload).unwrap();
    assert!(matches!(reply, varys_core::messages::RegisterClientReply::Failed { .. }));
}

#[tokio::test]
async fn heartbeat_keeps_an_agent_live_for_ranking() {
    let coord = TestCoordinator::with_heartbeat(Duration::from_millis(80)).await;
    let agent_conn = coord.connect().await;
    let slave_id = register_agent(&agent_conn, "s1", "host-a", 9000).await;

    let heartbeat = varys_core::messages::HeartbeatMsg { slave_id: slave_id.clone(), rx_bps: 123.0, tx_bps: 456.0 };
    agent_conn
        .call_one_way(Tag::Heartbeat, bincode::serialize(&heartbeat).unwrap())
        .await
        .unwrap();

    // Give the heartbeat time to land before asking for the ranking.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client_conn = coord.connect().await;
    let req = RequestBestMachinesReq { n: 5, adjust_bytes: 0 };
    let reply = client_conn.call(Tag::RequestBestRxMachines, bincode::serialize(&req).unwrap()).await.unwrap();
    let reply: BestMachinesReply = bincode::deserialize(&reply.payload).unwrap();
    assert_eq!(reply.hosts.len(), 1);
    assert_eq!(reply.hosts[0].slave_id, slave_id);
}

#[tokio::test]
async fn stale_agent_drops_out_of_ranking() {
    let heartbeat_interval = Duration::from_millis(40);
    let coord = TestCoordinator::with_heartbeat(heartbeat_interval).await;
    let agent_conn = coord.connect().await;
    register_agent(&agent_conn, "s1", "host-a", 9000).await;

    // An agent is live only within 3x the heartbeat interval with no further
    // heartbeats; wait past that window without sending one.
    tokio::time::sleep(heartbeat_interval * 4).await;

    let client_conn = coord.connect().await;
    let req = RequestBestMachinesReq { n: 5, adjust_bytes: 0 };
    let reply = client_conn.call(Tag::RequestBestRxMachines, bincode::serialize(&req).unwrap()).await.unwrap();
    let reply: BestMachinesReply = bincode::deserialize(&reply.payload).unwrap();
    assert!(reply.hosts.is_empty(), "a stale agent must not be ranked live");
}

#[tokio::test]
async fn client_disconnect_cascades_to_its_coflows_and_receivers() {
    let coord = TestCoordinator::start().await;
    let agent_conn = coord.connect().await;
    register_agent(&agent_conn, "s1", "host-a", 9000).await;

    let owner_conn = coord.connect().await;
    let owner_id = register_client(&owner_conn, "owner", "host-a", 9100).await;
    let coflow_id = register_coflow(&owner_conn, owner_id.clone()).await;

    let flow_id = FlowId::new("f1");
    let data_id = DataIdentifier::new(coflow_id.clone(), flow_id.clone());
    let desc = FlowDescription::fake(data_id.clone(), 4096, 1, "host-a", 9001);
    owner_conn
        .call_one_way(Tag::AddFlow, bincode::serialize(&AddFlowMsg { desc }).unwrap())
        .await
        .unwrap();

    let receiver_conn = coord.connect().await;
    let receiver_id = register_client(&receiver_conn, "receiver", "host-a", 9200).await;
    let found = get_flow(
        &receiver_conn,
        GetFlowReq {
            flow_id: flow_id.clone(),
            coflow_id: coflow_id.clone(),
            client_id: receiver_id,
            slave_id: SlaveId::new("s1"),
        },
    )
    .await;
    assert!(found.0.is_some(), "flow must be visible before the owner disconnects");

    // Dropping the owner's connection tears down the socket; the coordinator's
    // disconnect handler then cascades the coflow/flow/receivers cleanup.
    drop(owner_conn);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let still_there = get_flow(
        &receiver_conn,
        GetFlowReq {
            flow_id,
            coflow_id,
            client_id: ClientId::new("someone-else"),
            slave_id: SlaveId::new("s1"),
        },
    )
    .await;
    assert!(still_there.0.is_none(), "flow must be gone once its owning coflow cascaded away");
}

#[tokio::test]
async fn dispatch_loop_pushes_updated_rates_to_active_receivers() {
    // A policy that throttles every flow it sees to a fixed rate, so the
    // periodic dispatcher always has something to push.
    let policy = Arc::new(FnPolicy(|flows: &[FlowDescription]| {
        flows.iter().map(|f| (f.data_id.clone(), 5_000u64)).collect::<HashMap<_, _>>()
    }));
    let coord = TestCoordinator::with_policy(Duration::from_millis(30), policy).await;

    let agent_conn = coord.connect().await;
    register_agent(&agent_conn, "s1", "host-a", 9000).await;

    let owner_conn = coord.connect().await;
    let owner_id = register_client(&owner_conn, "owner", "host-a", 9100).await;
    let coflow_id = register_coflow(&owner_conn, owner_id).await;

    let flow_id = FlowId::new("f1");
    let data_id = DataIdentifier::new(coflow_id.clone(), flow_id.clone());
    let desc = FlowDescription::fake(data_id.clone(), 4096, 1, "host-a", 9001);
    owner_conn
        .call_one_way(Tag::AddFlow, bincode::serialize(&AddFlowMsg { desc }).unwrap())
        .await
        .unwrap();

    // Connect raw so the unsolicited `UpdatedRates` push isn't swallowed by
    // an `RpcClient` reader that only matches a pending request id.
    let receiver_conn = coord.connect_raw().await;
    let register_reply = ask_raw(
        &receiver_conn,
        Tag::RegisterClient,
        1,
        bincode::serialize(&varys_core::messages::RegisterClientReq {
            name: "receiver".into(),
            host: "host-a".into(),
            comm_port: 9200,
        })
        .unwrap(),
    )
    .await;
    let receiver_id = match bincode::deserialize(&register_reply.payload).unwrap() {
        varys_core::messages::RegisterClientReply::Registered { client_id, .. } => client_id,
        varys_core::messages::RegisterClientReply::Failed { message } => panic!("{message}"),
    };

    ask_raw(
        &receiver_conn,
        Tag::GetFlow,
        2,
        bincode::serialize(&GetFlowReq {
            flow_id,
            coflow_id,
            client_id: receiver_id,
            slave_id: SlaveId::new("s1"),
        })
        .unwrap(),
    )
    .await;

    let pushed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let frame = receiver_conn.recv_frame().await.unwrap();
            if frame.tag() == Tag::UpdatedRates {
                return frame;
            }
        }
    })
    .await
    .expect("coordinator must push an UpdatedRates frame within the dispatch window");

    let rates: UpdatedRatesMsg = bincode::deserialize(&pushed.payload).unwrap();
    assert_eq!(rates.rates.len(), 1);
    assert_eq!(rates.rates[0].bps, 5_000);
    assert_eq!(rates.rates[0].desc.data_id, data_id);
}
