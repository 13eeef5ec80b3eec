//! Structures des messages échangés sur le bus.
//!
//! Tout est sérialisé en JSON camelCase pour rester compatible avec le
//! dashboard qui consomme les topics de broadcast.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot des variables d'un script en cours de migration (mobilité forte).
///
/// Les valeurs sont restreintes à string/number/bool/list/map — tout le
/// reste est filtré silencieusement à la capture. `execution_point` vaut
/// toujours 0 : on ré-exécute le script entier depuis le début avec les
/// variables pré-chargées, il n'y a pas de reprise au niveau instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeState {
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub execution_point: u32,
    #[serde(default)]
    pub output: String,
}

impl CodeState {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.output.is_empty()
    }
}

/// L'unité de migration : un script, son point d'entrée, le nœud qui le
/// possède, et un état optionnel attaché pendant une migration STRONG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePackage {
    pub id: String,
    pub name: String,
    pub code: String,
    pub entry_point: String,
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CodeState>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ---- Worker -> Coordinateur ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRegistration {
    pub id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUnregister {
    pub node_id: String,
}

/// Metrics système échantillonnées sur le process du worker, toutes les 3 s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub node_id: String,
    pub cpu: f64,
    pub memory: f64,
    pub processes: u32,
    pub uptime: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub node_id: String,
}

/// Résultat réel d'une exécution, succès comme échec. C'est le seul canal
/// par lequel le coordinateur apprend l'issue d'un run — découplé du
/// statut de la migration qui l'a déclenché.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionComplete {
    pub node_id: String,
    pub code_id: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub console_output: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// État capturé renvoyé par un worker suite à une commande capture-state.
/// Un worker sans contexte répond avec un état explicitement vide, jamais
/// par le silence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCaptured {
    pub node_id: String,
    pub code_id: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub execution_point: u32,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl StateCaptured {
    pub fn into_state(self) -> CodeState {
        CodeState {
            variables: self.variables,
            execution_point: self.execution_point,
            output: self.output,
        }
    }
}

// ---- Coordinateur -> Worker ----

/// Signal informatif vers le nœud source : il détient déjà les octets du
/// code, aucune réponse n'est attendue.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCommand {
    pub code_id: String,
    pub migration_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommand {
    pub code_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCommand {
    pub code_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStateCommand {
    pub code_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_package_wire_format_is_camel_case() {
        let pkg = CodePackage {
            id: "abc123".into(),
            name: "counter".into(),
            code: "let x = 1;".into(),
            entry_point: "run".into(),
            current_node_id: Some("node-1".into()),
            state: None,
            metadata: HashMap::new(),
        };
        let json = serde_json::to_value(&pkg).unwrap();
        assert_eq!(json["entryPoint"], "run");
        assert_eq!(json["currentNodeId"], "node-1");
        // state absent du wire quand None
        assert!(json.get("state").is_none());
    }

    #[test]
    fn state_captured_defaults_to_empty() {
        let msg: StateCaptured =
            serde_json::from_str(r#"{"nodeId":"n1","codeId":"c1"}"#).unwrap();
        assert!(msg.into_state().is_empty());
    }
}
