//! The coordinator's accept loop.
//!
//! Unlike the generic request/reply loop in `varys_transport::rpc::serve`,
//! the coordinator needs the `Arc<TcpConnection>` itself (to register it
//! against a freshly registered peer, and to push unsolicited `UpdatedRates`
//! frames later), so it runs its own loop directly against the transport's
//! framed primitives.

use std::sync::Arc;

use tracing::{debug, warn};
use varys_transport::{Reply, TcpConnection, TcpTransport, TcpTransportConfig};

use crate::handler::CoordinatorState;

/// Binds `bind_addr` and serves connections until the process exits.
pub async fn run(state: Arc<CoordinatorState>, bind_addr: &str) -> varys_transport::Result<()> {
    let (listener, addr) = bind(bind_addr).await?;
    tracing::info!(%addr, "coordinator listening");
    serve_accepted(state, listener).await
}

/// Binds `bind_addr`, returning the listener alongside the address it was
/// actually bound to (useful when `bind_addr` ends in `:0`). Callers hand the
/// listener to [`serve_accepted`] to start accepting connections.
pub async fn bind(bind_addr: &str) -> varys_transport::Result<(tokio::net::TcpListener, std::net::SocketAddr)> {
    let transport = TcpTransport::new(TcpTransportConfig::default());
    let listener = transport.listen(bind_addr).await?;
    let addr = listener.local_addr().map_err(varys_transport::TransportError::IoError)?;
    Ok((listener, addr))
}

/// Serves connections off an already-bound listener until the process exits
/// or the listener errors.
pub async fn serve_accepted(state: Arc<CoordinatorState>, listener: tokio::net::TcpListener) -> varys_transport::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(varys_transport::TransportError::IoError)?;
        debug!(peer = %peer_addr, "accepted connection");
        let conn = match TcpConnection::from_stream(stream) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!(error = %e, "failed to adopt accepted stream");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move { serve_connection(state, conn).await });
    }
}

async fn serve_connection(state: Arc<CoordinatorState>, conn: Arc<TcpConnection>) {
    loop {
        let frame = match conn.recv_frame().await {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "connection closed");
                state.handle_disconnect(&conn).await;
                break;
            }
        };
        match state.handle_frame(&conn, frame.clone()).await {
            Reply::Message(tag, payload) => {
                let response = frame.reply(tag, payload);
                if let Err(e) = conn.send_frame(&response).await {
                    warn!(error = %e, "failed to send reply");
                    state.handle_disconnect(&conn).await;
                    break;
                }
            }
            Reply::None => {}
        }
    }
}

/// Runs the periodic rate-allocation dispatch loop until the process exits.
pub async fn run_dispatch_loop(state: Arc<CoordinatorState>) {
    let mut ticker = tokio::time::interval(state.config.allocation_interval);
    loop {
        ticker.tick().await;
        state.dispatch_rate_updates().await;
    }
}
