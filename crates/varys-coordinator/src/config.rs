//! Coordinator configuration: bind address and the heartbeat/allocation
//! intervals, assembled from environment variables the same way the agent's
//! `AgentConfig::from_env` is.

use std::time::Duration;

use varys_core::{Result, VarysError};

/// Tunables for the coordinator's listener and periodic tasks.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the control-plane listener binds to (`VARYS_COORD_ADDR`).
    pub bind_addr: String,
    /// An agent is considered live iff it has heartbeated within
    /// `3 * heartbeat_interval` (catalog invariant 4). `VARYS_COORD_HEARTBEAT_MS`.
    pub heartbeat_interval: Duration,
    /// Period between rate-allocation policy invocations; defaults to
    /// `heartbeat_interval` per the design's periodic rate dispatch section.
    /// `VARYS_COORD_ALLOC_MS`.
    pub allocation_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_secs(5);
        Self {
            bind_addr: "0.0.0.0:7077".to_string(),
            heartbeat_interval,
            allocation_interval: heartbeat_interval,
        }
    }
}

impl CoordinatorConfig {
    /// Builds a configuration from the environment, falling back to
    /// [`CoordinatorConfig::default`]'s values for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let bind_addr = std::env::var("VARYS_COORD_ADDR").unwrap_or(defaults.bind_addr);
        let heartbeat_interval = env_millis("VARYS_COORD_HEARTBEAT_MS", defaults.heartbeat_interval)?;
        let allocation_interval = env_millis("VARYS_COORD_ALLOC_MS", heartbeat_interval)?;
        Ok(Self { bind_addr, heartbeat_interval, allocation_interval })
    }
}

fn env_millis(var: &str, default: Duration) -> Result<Duration> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| VarysError::Configuration(format!("{var} is not a valid millisecond count: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        std::env::remove_var("VARYS_COORD_ADDR");
        std::env::remove_var("VARYS_COORD_HEARTBEAT_MS");
        std::env::remove_var("VARYS_COORD_ALLOC_MS");
        let config = CoordinatorConfig::from_env().unwrap();
        let defaults = CoordinatorConfig::default();
        assert_eq!(config.bind_addr, defaults.bind_addr);
        assert_eq!(config.heartbeat_interval, defaults.heartbeat_interval);
        assert_eq!(config.allocation_interval, defaults.allocation_interval);
    }

    #[test]
    fn invalid_heartbeat_env_is_a_configuration_error() {
        std::env::set_var("VARYS_COORD_HEARTBEAT_MS", "not-a-number");
        let result = CoordinatorConfig::from_env();
        std::env::remove_var("VARYS_COORD_HEARTBEAT_MS");
        assert!(matches!(result, Err(VarysError::Configuration(_))));
    }

    #[test]
    fn allocation_interval_defaults_to_heartbeat_interval_when_unset() {
        std::env::remove_var("VARYS_COORD_ALLOC_MS");
        std::env::set_var("VARYS_COORD_HEARTBEAT_MS", "2500");
        let config = CoordinatorConfig::from_env().unwrap();
        std::env::remove_var("VARYS_COORD_HEARTBEAT_MS");
        assert_eq!(config.allocation_interval, Duration::from_millis(2500));
    }
}
