//! Agent configuration: ports, work directory, and the coordinator address,
//! assembled from environment variables per the design's recognized set.

use std::time::Duration;

use varys_core::{Result, VarysError};

/// Default heartbeat/NIC-sampling interval.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// Runtime configuration for one agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// This agent's id, chosen by the operator (must be cluster-unique).
    pub slave_id: String,
    /// Address of the coordinator to register with (`host:port`).
    pub coordinator_addr: String,
    /// Host this agent is reachable on.
    pub host: String,
    /// Combined data-plane/control-relay port (`VARYS_SLAVE_PORT`).
    pub port: u16,
    /// Web UI port, opaque to the core (`VARYS_SLAVE_WEBUI_PORT`).
    pub web_ui_port: u16,
    /// Work directory (`VARYS_SLAVE_DIR`, default `$VARYS_HOME/work`).
    pub work_dir: String,
    /// Externally-advertised host override (`VARYS_PUBLIC_DNS`).
    pub public_host: Option<String>,
    /// How often to sample NIC counters and send a heartbeat.
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    /// Builds a configuration from explicit values, applying the environment's
    /// overrides the same way the agent binary would at startup.
    pub fn from_env(slave_id: impl Into<String>, coordinator_addr: impl Into<String>, host: impl Into<String>) -> Result<Self> {
        let port = env_port("VARYS_SLAVE_PORT", 9000)?;
        let web_ui_port = env_port("VARYS_SLAVE_WEBUI_PORT", 9001)?;
        let varys_home = std::env::var("VARYS_HOME").unwrap_or_else(|_| "/tmp/varys".to_string());
        let work_dir = std::env::var("VARYS_SLAVE_DIR").unwrap_or_else(|_| format!("{varys_home}/work"));
        let public_host = std::env::var("VARYS_PUBLIC_DNS").ok();

        Ok(Self {
            slave_id: slave_id.into(),
            coordinator_addr: coordinator_addr.into(),
            host: host.into(),
            port,
            web_ui_port,
            work_dir,
            public_host,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        })
    }

    /// This agent's control-plane/data-plane port (both protocols share `commPort`).
    pub fn comm_port(&self) -> u16 {
        self.port
    }
}

fn env_port(var: &str, default: u16) -> Result<u16> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| VarysError::Configuration(format!("{var} is not a valid port: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_port_env_is_a_configuration_error() {
        std::env::set_var("VARYS_SLAVE_PORT", "not-a-port");
        let result = AgentConfig::from_env("s1", "127.0.0.1:7077", "127.0.0.1");
        std::env::remove_var("VARYS_SLAVE_PORT");
        assert!(matches!(result, Err(VarysError::Configuration(_))));
    }

    #[test]
    fn defaults_apply_when_env_unset() {
        std::env::remove_var("VARYS_SLAVE_PORT");
        std::env::remove_var("VARYS_SLAVE_WEBUI_PORT");
        std::env::remove_var("VARYS_SLAVE_DIR");
        let config = AgentConfig::from_env("s1", "127.0.0.1:7077", "127.0.0.1").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.web_ui_port, 9001);
    }
}
