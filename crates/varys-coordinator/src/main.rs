//! Coordinator process entry point.

use std::sync::Arc;

use varys_coordinator::{CoordinatorConfig, CoordinatorState, IdentityPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = CoordinatorConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(CoordinatorState::new(Arc::new(IdentityPolicy), config));

    let dispatch_state = state.clone();
    tokio::spawn(async move {
        varys_coordinator::server::run_dispatch_loop(dispatch_state).await;
    });

    varys_coordinator::server::run(state, &bind_addr).await?;
    Ok(())
}
