use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub migration: MigrationConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

/// Réglages de l'orchestrateur. Le délai de pacing après chaque checkpoint
/// sert à la visualisation; zéro est valide et ne change pas la
/// correction. La fenêtre de capture borne l'attente d'état en mobilité
/// forte.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MigrationConf {
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_capture_wait_ms")]
    pub capture_wait_ms: u64,
}

fn default_http_port() -> u16 {
    8080
}
fn default_pacing_ms() -> u64 {
    800
}
fn default_capture_wait_ms() -> u64 {
    5000
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

impl Default for MigrationConf {
    fn default() -> Self {
        Self { pacing_ms: default_pacing_ms(), capture_wait_ms: default_capture_wait_ms() }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            http_port: default_http_port(),
            migration: MigrationConf::default(),
        }
    }
}

pub async fn load_config() -> CoordinatorConfig {
    let path = std::env::var("PEREGRINE_CONFIG").unwrap_or_else(|_| "coordinator.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return CoordinatorConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[coordinator] config invalide: {e}");
            CoordinatorConfig::default()
        })
    } else {
        eprintln!("[coordinator] pas de coordinator.yaml, usage config par défaut");
        CoordinatorConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg: CoordinatorConfig =
            serde_yaml::from_str("mqtt:\n  host: broker\n  port: 1884\n").unwrap();
        assert_eq!(cfg.mqtt.host, "broker");
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.migration.pacing_ms, 800);
        assert_eq!(cfg.migration.capture_wait_ms, 5000);
    }
}
