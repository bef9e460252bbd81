#![warn(missing_docs)]

//! Varys transport subsystem: a framed, multiplexed control-plane RPC channel,
//! a one-shot length-prefixed data-plane protocol, and the client-side
//! token-bucket throttle.

/// Transport-specific error type.
pub mod error;
/// Binary frame format and the fixed control-plane wire tags.
pub mod protocol;
/// Multiplexed request/reply RPC client and server accept loop.
pub mod rpc;
/// TCP connection setup and framed read/write helpers.
pub mod tcp;
/// Token-bucket throttled reader for rate-limited data-plane reads.
pub mod throttle;

pub use error::{Result, TransportError};
pub use protocol::{Frame, FrameHeader, Tag, FRAME_HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE};
pub use rpc::{serve, Reply, RpcClient, RpcClientConfig, RpcHandler};
pub use tcp::{TcpConnection, TcpTransport, TcpTransportConfig};
pub use throttle::{ThrottledReader, TokenBucket, DEFAULT_REFILL_GRANULARITY, MIN_BUCKET_BYTES};
