//! Opaque string identifiers shared across the coordinator, agent, and client.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        /// Opaque, cluster-wide unique identifier.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw string as an identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrows the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(ClientId);
opaque_id!(SlaveId);
opaque_id!(CoflowId);
opaque_id!(FlowId);

/// The pair identifying a flow uniquely cluster-wide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataIdentifier {
    /// The coflow this flow belongs to.
    pub coflow_id: CoflowId,
    /// The flow's own id, unique within its coflow.
    pub flow_id: FlowId,
}

impl DataIdentifier {
    /// Builds a new data identifier from its two components.
    pub fn new(coflow_id: CoflowId, flow_id: FlowId) -> Self {
        Self { coflow_id, flow_id }
    }
}

impl fmt::Display for DataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.coflow_id, self.flow_id)
    }
}

/// Wall-clock timestamp, monotonic only by construction order (not by clock skew).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since Unix epoch.
    pub secs: u64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl Timestamp {
    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before epoch");
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }

    /// Elapsed duration from `self` to `other`, saturating at zero if `other` precedes `self`.
    pub fn elapsed_since(&self, other: &Timestamp) -> std::time::Duration {
        let self_nanos = self.secs as i128 * 1_000_000_000 + self.nanos as i128;
        let other_nanos = other.secs as i128 * 1_000_000_000 + other.nanos as i128;
        let delta = (self_nanos - other_nanos).max(0) as u128;
        std::time::Duration::from_nanos(delta as u64)
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs.cmp(&other.secs).then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
