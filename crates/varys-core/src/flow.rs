//! Flow descriptors: the unit of data the fabric moves between clients.

use crate::ids::DataIdentifier;
use serde::{Deserialize, Serialize};

/// Where a flow's bytes originate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Bytes live in the publishing client's process memory.
    InMemory,
    /// Bytes live in a file on the origin host.
    OnDisk,
    /// Bytes are synthesized on demand; nothing is actually stored.
    Fake,
}

impl DataType {
    /// A stable, human-readable label, mainly used in `TypeMismatch` errors.
    pub fn label(self) -> &'static str {
        match self {
            DataType::InMemory => "INMEMORY",
            DataType::OnDisk => "ONDISK",
            DataType::Fake => "FAKE",
        }
    }
}

/// The on-disk location of an ONDISK flow's bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    /// Path to the backing file, resolved on the origin host.
    pub path_to_file: String,
    /// Byte offset of the flow's data within the file.
    pub offset: u64,
    /// Length in bytes of the flow's data within the file.
    pub length: u64,
}

/// The central flow record, shared verbatim between coordinator, agent, and client.
///
/// `origin_port` may be rewritten by the publishing client's host agent before
/// registration (see the agent's control-relay step) so that non-INMEMORY flows
/// are served by the agent rather than by the publishing client itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDescription {
    /// Globally unique (coflowId, flowId) pair.
    pub data_id: DataIdentifier,
    /// Where the bytes come from.
    pub data_type: DataType,
    /// Total size of the flow's payload.
    pub size_in_bytes: u64,
    /// Expected number of distinct receivers (fan-out) before the flow is complete.
    pub num_receivers: u32,
    /// Host serving the bytes for this flow.
    pub origin_host: String,
    /// Port serving the bytes for this flow.
    pub origin_port: u16,
    /// Only present for ONDISK flows.
    pub file: Option<FileLocation>,
    /// Opaque class name carried for INMEMORY flows; never interpreted by the core.
    pub class_name: Option<String>,
}

impl FlowDescription {
    /// Builds a FAKE flow descriptor: `sizeInBytes` bytes of a deterministic pattern.
    pub fn fake(
        data_id: DataIdentifier,
        size_in_bytes: u64,
        num_receivers: u32,
        origin_host: impl Into<String>,
        origin_port: u16,
    ) -> Self {
        Self {
            data_id,
            data_type: DataType::Fake,
            size_in_bytes,
            num_receivers,
            origin_host: origin_host.into(),
            origin_port,
            file: None,
            class_name: None,
        }
    }

    /// Builds an ONDISK flow descriptor.
    pub fn on_disk(
        data_id: DataIdentifier,
        num_receivers: u32,
        origin_host: impl Into<String>,
        origin_port: u16,
        file: FileLocation,
    ) -> Self {
        Self {
            data_id,
            data_type: DataType::OnDisk,
            size_in_bytes: file.length,
            num_receivers,
            origin_host: origin_host.into(),
            origin_port,
            file: Some(file),
            class_name: None,
        }
    }

    /// Builds an INMEMORY flow descriptor. `origin_port` is the publishing client's
    /// own data server port; it is never rewritten by the agent for this data type.
    pub fn in_memory(
        data_id: DataIdentifier,
        size_in_bytes: u64,
        num_receivers: u32,
        origin_host: impl Into<String>,
        origin_port: u16,
        class_name: Option<String>,
    ) -> Self {
        Self {
            data_id,
            data_type: DataType::InMemory,
            size_in_bytes,
            num_receivers,
            origin_host: origin_host.into(),
            origin_port,
            file: None,
            class_name,
        }
    }
}
