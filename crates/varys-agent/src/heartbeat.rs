//! The periodic heartbeat task: samples NIC counters and reports them to the
//! coordinator every `heartbeat_interval`. A failed send is fatal — loss of
//! the coordinator link has no reconnection path in this version.

use std::time::Instant;

use varys_core::{HeartbeatMsg, Result, SlaveId, VarysError};
use varys_transport::Tag;

use crate::netstats::NicSampler;
use crate::registration::RegisteredAgent;
use crate::state::{AgentState, StateHandle};

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

/// Runs the heartbeat loop until a send fails, at which point the lifecycle
/// state advances to `Terminated` and the error is returned to the caller.
pub async fn run(agent: &RegisteredAgent, state: &StateHandle) -> Result<()> {
    let slave_id = SlaveId::new(agent.config.slave_id.clone());
    let mut sampler = NicSampler::new();
    let mut ticker = tokio::time::interval(agent.config.heartbeat_interval);
    let mut last_tick = Instant::now();

    loop {
        ticker.tick().await;
        state.advance(AgentState::Heartbeating);

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        let bandwidth = sampler.sample(elapsed).unwrap_or(crate::netstats::Bandwidth { rx_bps: 0.0, tx_bps: 0.0 });

        let msg = HeartbeatMsg { slave_id: slave_id.clone(), rx_bps: bandwidth.rx_bps, tx_bps: bandwidth.tx_bps };
        if let Err(e) = agent.rpc.call_one_way(Tag::Heartbeat, encode(&msg)).await {
            state.advance(AgentState::Terminated);
            return Err(VarysError::Connectivity(format!("heartbeat send failed: {e}")));
        }
        state.advance(AgentState::Running);
    }
}

