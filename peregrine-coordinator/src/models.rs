use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    Coordinator,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Online,
    Offline,
    Busy,
    Migrating,
}

/// Metrics d'un nœud, remplacées telles quelles à chaque rapport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub active_processes: u32,
    pub uptime: u64,
}

impl NodeMetrics {
    /// Seule fonction de ranking pour la sélection de cible.
    pub fn load_score(&self) -> f64 {
        self.cpu_usage * 0.6 + self.memory_usage * 0.4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub metrics: Option<NodeMetrics>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
}

/// Snapshot ponctuel de la flotte, sans garantie de cohérence face aux
/// mutations concurrentes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    pub nodes: Vec<Node>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// Code seul, exécution repart de zéro sur la cible.
    Weak,
    /// Code + snapshot des variables, ré-exécution avec état pré-chargé.
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    // Modélisé mais jamais atteint : aucune annulation n'est câblée.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    pub id: String,
    pub code_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    pub status: MigrationStatus,
    pub progress: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub error_message: Option<String>,
}

// ---- DTOs REST ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeUpload {
    pub name: String,
    pub code: String,
    pub entry_point: String,
    #[serde(default)]
    pub initial_node_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub code_id: String,
    #[serde(default)]
    pub source_node_id: Option<String>,
    pub target_node_id: String,
    #[serde(default, rename = "type")]
    pub migration_type: Option<MigrationType>,
}

/// Ids courts (8 hex) pour migrations et code packages, uniques pour la
/// durée de vie du coordinateur.
pub fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_score_weights_cpu_over_memory() {
        let m = NodeMetrics { cpu_usage: 10.0, memory_usage: 20.0, active_processes: 0, uptime: 0 };
        assert!((m.load_score() - 14.0).abs() < f64::EPSILON);
        let m = NodeMetrics { cpu_usage: 50.0, memory_usage: 10.0, active_processes: 0, uptime: 0 };
        assert!((m.load_score() - 34.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_ids_are_short_and_unique() {
        let a = short_id();
        let b = short_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn migration_serializes_type_field() {
        let m = Migration {
            id: "m1".into(),
            code_id: "c1".into(),
            source_node_id: "node-1".into(),
            target_node_id: "node-2".into(),
            migration_type: MigrationType::Strong,
            status: MigrationStatus::Pending,
            progress: 0,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            error_message: None,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "STRONG");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["sourceNodeId"], "node-1");
    }
}
