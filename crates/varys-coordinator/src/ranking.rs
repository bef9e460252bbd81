//! Host ranking: a pure function over an agent-table snapshot, used to answer
//! `RequestBestRxMachines`/`RequestBestTxMachines`.

use varys_core::AgentRecord;
use varys_core::Timestamp;

/// Direction to rank agents by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Rank by ingress (`lastRxBps`).
    Rx,
    /// Rank by egress (`lastTxBps`).
    Tx,
}

/// Returns the `n` live agents with the smallest `measured + adjustBytes/interval`,
/// ascending; ties are broken by `slaveId` lexicographic order. Dead agents
/// (per [`AgentRecord::is_live`]) are excluded entirely.
pub fn best_machines(
    agents: &[AgentRecord],
    direction: Direction,
    n: u32,
    adjust_bytes: i64,
    interval: std::time::Duration,
    heartbeat_interval: std::time::Duration,
    now: Timestamp,
) -> Vec<AgentRecord> {
    let adjust_bps = if interval.is_zero() {
        0.0
    } else {
        (adjust_bytes as f64 * 8.0) / interval.as_secs_f64()
    };

    let mut live: Vec<AgentRecord> = agents
        .iter()
        .filter(|a| a.is_live(now, heartbeat_interval))
        .cloned()
        .collect();

    live.sort_by(|a, b| {
        let measured_a = measured(a, direction) + adjust_bps;
        let measured_b = measured(b, direction) + adjust_bps;
        measured_a
            .partial_cmp(&measured_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.slave_id.as_str().cmp(b.slave_id.as_str()))
    });

    live.truncate(n as usize);
    live
}

fn measured(agent: &AgentRecord, direction: Direction) -> f64 {
    match direction {
        Direction::Rx => agent.last_rx_bps,
        Direction::Tx => agent.last_tx_bps,
    }
}
