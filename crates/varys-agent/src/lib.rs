#![warn(missing_docs)]

//! The Varys host agent: one per machine. Measures local NIC throughput,
//! serves bulk data for `FAKE`/`ONDISK` flows, and relays control messages
//! between local clients and the coordinator.

/// Environment-derived agent configuration.
pub mod config;
/// `FAKE`/`ONDISK` byte serving for `GetRequest`.
pub mod dataserver;
/// The periodic NIC-sampling heartbeat task.
pub mod heartbeat;
/// Cumulative NIC counter sampling and windowed bps derivation.
pub mod netstats;
/// Coordinator registration.
pub mod registration;
/// Control-message relay from local clients to the coordinator.
pub mod relay;
/// The shared `commPort` accept loop (data plane + control relay).
pub mod server;
/// The agent's lifecycle state machine.
pub mod state;

pub use config::AgentConfig;
pub use registration::{register, RegisteredAgent};
pub use state::{AgentState, StateHandle};
