//! Host agent process entry point.

use std::sync::Arc;

use tracing::error;
use varys_agent::state::{AgentState, StateHandle};
use varys_agent::{config::AgentConfig, heartbeat, registration, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let slave_id = std::env::var("VARYS_SLAVE_ID").unwrap_or_else(|_| "agent-1".to_string());
    let coordinator_addr =
        std::env::var("VARYS_COORDINATOR_ADDR").unwrap_or_else(|_| "127.0.0.1:7077".to_string());
    let host = std::env::var("VARYS_SLAVE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

    let config = AgentConfig::from_env(slave_id, coordinator_addr, host)?;
    let state = Arc::new(StateHandle::new());
    state.advance(AgentState::Connecting);

    let agent = Arc::new(registration::register(config).await?);
    state.advance(AgentState::Registered);
    state.advance(AgentState::Running);

    let server_agent = agent.clone();
    let server_task = tokio::spawn(async move { server::run(server_agent).await });

    let heartbeat_state = state.clone();
    let result = heartbeat::run(&agent, &heartbeat_state).await;
    server_task.abort();

    if let Err(e) = result {
        error!(error = %e, "coordinator link lost, terminating");
        std::process::exit(1);
    }
    Ok(())
}
