//! Agent configuration from environment variables.
//!
//! Everything has a default so a bare `peregrine-agent` joins a local
//! broker out of the box. Multi-node setups on one machine only need
//! PEREGRINE_NODE_ID and PEREGRINE_PORT to differ.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub broker_host: String,
    pub broker_port: u16,
    pub metrics_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let node_id = std::env::var("PEREGRINE_NODE_ID")
            .unwrap_or_else(|_| format!("worker-{}", &Uuid::new_v4().to_string()[..8]));
        Self {
            node_id,
            host: env_or("PEREGRINE_HOST", "127.0.0.1"),
            port: env_parse("PEREGRINE_PORT", 8081),
            broker_host: env_or("PEREGRINE_BROKER_HOST", "localhost"),
            broker_port: env_parse("PEREGRINE_BROKER_PORT", 1883),
            metrics_interval_secs: 3,
            heartbeat_interval_secs: 10,
            reconnect_delay_secs: 5,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let cfg = AgentConfig::from_env();
        assert_eq!(cfg.broker_port, 1883);
        assert!(!cfg.node_id.is_empty());
    }
}
