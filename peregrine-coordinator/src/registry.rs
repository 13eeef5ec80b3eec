/**
 * NODE REGISTRY - Table de membership de la flotte côté coordinateur
 *
 * RÔLE : Registration/déconnexion des workers, santé et metrics par nœud,
 * snapshot et broadcast de la topologie, sélection de cible par charge.
 *
 * ARCHITECTURE : Map partagée derrière une instance unique, mutée par les
 * callbacks bus et le pool de migration; aucun accès statique. Chaque
 * mutation visible déclenche un broadcast topologie sur le bus.
 */

use crate::models::{Node, NodeMetrics, NodeRole, NodeStatus, TopologySnapshot};
use crate::state::{new_state, Shared};
use peregrine_proto::{now_millis, topics, EventBus, MetricsReport, NodeRegistration};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

pub struct NodeRegistry {
    nodes: Shared<HashMap<String, Node>>,
    bus: Arc<dyn EventBus>,
}

impl NodeRegistry {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { nodes: new_state(HashMap::new()), bus }
    }

    /// Upsert par id — une re-registration écrase la précédente, le dernier
    /// écrivain gagne. Statut forcé ONLINE, rôle WORKER, pas de metrics
    /// avant le premier rapport.
    pub async fn register_node(&self, reg: NodeRegistration) {
        let node = Node {
            id: reg.id.clone(),
            host: reg.host.clone(),
            port: reg.port,
            role: NodeRole::Worker,
            status: NodeStatus::Online,
            metrics: None,
            connected_at: OffsetDateTime::now_utc(),
        };
        self.nodes.lock().insert(reg.id.clone(), node);
        println!("[registry] >>> node REGISTERED: {} at {}:{}", reg.id, reg.host, reg.port);

        self.broadcast_topology().await;
        self.bus
            .publish(
                &topics::node_ack(&reg.id, "registered"),
                json!({ "status": "ok", "nodeId": reg.id, "timestamp": now_millis() }),
            )
            .await;
    }

    /// No-op si le nœud est inconnu.
    pub async fn unregister_node(&self, node_id: &str) {
        let removed = self.nodes.lock().remove(node_id);
        if let Some(node) = removed {
            println!(
                "[registry] <<< node UNREGISTERED: {} (was at {}:{})",
                node_id, node.host, node.port
            );
            self.broadcast_topology().await;
        }
    }

    /// Remplace les metrics si le nœud existe, drop silencieux sinon —
    /// aucun signal d'erreur vers l'émetteur.
    pub async fn update_metrics(&self, report: MetricsReport) {
        let metrics = NodeMetrics {
            cpu_usage: report.cpu,
            memory_usage: report.memory,
            active_processes: report.processes,
            uptime: report.uptime,
        };
        let known = {
            let mut nodes = self.nodes.lock();
            match nodes.get_mut(&report.node_id) {
                Some(node) => {
                    node.metrics = Some(metrics.clone());
                    true
                }
                None => false,
            }
        };
        if known {
            self.bus
                .publish(&topics::metrics_broadcast(&report.node_id), json!(metrics))
                .await;
        }
    }

    /// No-op silencieux si le nœud est inconnu.
    pub async fn update_status(&self, node_id: &str, status: NodeStatus) {
        let known = {
            let mut nodes = self.nodes.lock();
            match nodes.get_mut(node_id) {
                Some(node) => {
                    node.status = status;
                    true
                }
                None => false,
            }
        };
        if known {
            self.broadcast_topology().await;
        }
    }

    /// Heartbeat : remet le nœud ONLINE (sans broadcast) et répond un pong.
    pub async fn touch_heartbeat(&self, node_id: &str) {
        {
            let mut nodes = self.nodes.lock();
            if let Some(node) = nodes.get_mut(node_id) {
                node.status = NodeStatus::Online;
            }
        }
        self.bus
            .publish(&topics::node_ack(node_id, "pong"), json!({ "timestamp": now_millis() }))
            .await;
    }

    pub fn get_node(&self, node_id: &str) -> Option<Node> {
        self.nodes.lock().get(node_id).cloned()
    }

    pub fn topology(&self) -> TopologySnapshot {
        TopologySnapshot {
            nodes: self.nodes.lock().values().cloned().collect(),
            timestamp: now_millis(),
        }
    }

    /// Sélection de cible : minimum de load_score parmi les nœuds ONLINE
    /// avec metrics, id différent de `exclude`. Les égalités exactes se
    /// résolvent par ordre d'itération, non spécifié.
    pub fn find_best_target(&self, exclude: &str) -> Option<Node> {
        self.nodes
            .lock()
            .values()
            .filter(|n| n.id != exclude)
            .filter(|n| n.status == NodeStatus::Online)
            .filter(|n| n.metrics.is_some())
            .min_by(|a, b| {
                let la = a.metrics.as_ref().map(NodeMetrics::load_score).unwrap_or(f64::MAX);
                let lb = b.metrics.as_ref().map(NodeMetrics::load_score).unwrap_or(f64::MAX);
                la.total_cmp(&lb)
            })
            .cloned()
    }

    async fn broadcast_topology(&self) {
        self.bus.publish(topics::TOPOLOGY, json!(self.topology())).await;
    }
}
