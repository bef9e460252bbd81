//! Shared error taxonomy for the coordinator, agent, and client.

use crate::ids::DataIdentifier;
use thiserror::Error;

/// Errors common to every role in the fabric.
///
/// Propagation policy: the data plane never retries and control messages never
/// retry either; a caller that observes one of these decides what to do next.
#[derive(Debug, Error)]
pub enum VarysError {
    /// Malformed URL, duplicate slave id, or a missing mandatory argument. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Peer unreachable at registration, or the connection dropped mid-session.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Unknown wire tag or a payload that failed to decode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `GetFlow` for an id the coordinator doesn't know about.
    #[error("flow not found: {0}")]
    NotFound(DataIdentifier),

    /// `get*` received bytes whose actual data type doesn't match the caller's expectation.
    #[error("type mismatch for {id}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The flow in question.
        id: DataIdentifier,
        /// What the caller asked for.
        expected: &'static str,
        /// What the flow actually is.
        found: &'static str,
    },

    /// A synchronous ask exceeded its timeout; any late reply is discarded by the caller.
    #[error("ask for {what} timed out after {timeout_ms}ms")]
    Timeout {
        /// Description of the operation that timed out.
        what: String,
        /// The timeout that was exceeded.
        timeout_ms: u64,
    },
}

/// Convenience alias used throughout the fabric's crates.
pub type Result<T> = std::result::Result<T, VarysError>;
