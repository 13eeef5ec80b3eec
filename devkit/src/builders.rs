//! Builders de messages conformes au contrat peregrine, pour les tests.

use peregrine_proto::now_millis;
use serde_json::{json, Value};

pub struct PeregrineMessageBuilder;

impl PeregrineMessageBuilder {
    /// Message de registration d'un worker.
    pub fn registration(node_id: &str, host: &str, port: u16) -> Value {
        json!({ "id": node_id, "host": host, "port": port })
    }

    /// Rapport de metrics périodique d'un worker.
    pub fn metrics(node_id: &str, cpu: f64, memory: f64, processes: u32, uptime: u64) -> Value {
        json!({
            "nodeId": node_id,
            "cpu": cpu,
            "memory": memory,
            "processes": processes,
            "uptime": uptime
        })
    }

    pub fn heartbeat(node_id: &str) -> Value {
        json!({ "nodeId": node_id })
    }

    /// État capturé renvoyé par un worker (mobilité forte).
    pub fn state_captured(node_id: &str, code_id: &str, variables: Value) -> Value {
        json!({
            "nodeId": node_id,
            "codeId": code_id,
            "variables": variables,
            "executionPoint": 0,
            "output": "",
            "timestamp": now_millis()
        })
    }

    /// Résultat d'exécution renvoyé par un worker.
    pub fn execution_complete(node_id: &str, code_id: &str, result: &str, error: &str) -> Value {
        json!({
            "nodeId": node_id,
            "codeId": code_id,
            "result": result,
            "error": error,
            "consoleOutput": "",
            "status": if error.is_empty() { "completed" } else { "error" },
            "timestamp": now_millis()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_match_wire_contract() {
        let m = PeregrineMessageBuilder::metrics("node-1", 12.5, 40.0, 3, 1000);
        assert_eq!(m["nodeId"], "node-1");
        assert_eq!(m["cpu"], 12.5);

        let s = PeregrineMessageBuilder::state_captured("node-1", "c1", json!({"x": 1}));
        let parsed: peregrine_proto::StateCaptured = serde_json::from_value(s).unwrap();
        assert_eq!(parsed.variables["x"], 1);

        let e = PeregrineMessageBuilder::execution_complete("node-1", "c1", "42", "");
        assert_eq!(e["status"], "completed");
    }
}
