//! Control-message relay: forwards a local client's `AddFlow`/`UnregisterCoflow`/
//! `DeleteFlow` up to the coordinator, rewriting `originPort` for non-INMEMORY
//! flows so the agent's own data server — not the publishing client — answers
//! `GetRequest`s for them. `GetFlow` arriving here is purely informational
//! (the client already asked the coordinator directly for resolution).

use varys_core::{AddFlowMsg, DataType};
use varys_transport::{Frame, Tag};

use crate::registration::RegisteredAgent;

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Option<T> {
    bincode::deserialize(payload).ok()
}

fn encode<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message payload always serializes")
}

/// Handles one control-plane frame received from a local client on the
/// shared `commPort`. Relayed messages are fire-and-forget, matching the
/// control plane's no-retry policy.
pub async fn relay_frame(agent: &RegisteredAgent, frame: &Frame) {
    match frame.tag() {
        Tag::AddFlow => {
            let Some(mut msg) = decode::<AddFlowMsg>(&frame.payload) else {
                tracing::warn!("malformed AddFlow payload from local client");
                return;
            };
            if msg.desc.data_type != DataType::InMemory {
                msg.desc.origin_port = agent.config.comm_port();
            }
            let payload = encode(&msg);
            if let Err(e) = agent.rpc.call_one_way(Tag::AddFlow, payload).await {
                tracing::warn!(error = %e, "failed to relay AddFlow to coordinator");
            }
        }
        Tag::UnregisterCoflow | Tag::DeleteFlow => {
            if let Err(e) = agent.rpc.call_one_way(frame.tag(), frame.payload.clone()).await {
                tracing::warn!(error = %e, tag = ?frame.tag(), "failed to relay message to coordinator");
            }
        }
        Tag::GetFlow => {
            // Receiver-side accounting only; the coordinator already saw this
            // ask directly from the client. Nothing to relay.
        }
        other => {
            tracing::debug!(tag = ?other, "ignoring unexpected relay tag from local client");
        }
    }
}
