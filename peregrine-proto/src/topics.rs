//! Schéma des topics MQTT, tous sous le préfixe `peregrine/`.
//!
//! Trois familles :
//! - commandes coordinateur -> worker, adressées par nœud : `peregrine/node/{id}/{cmd}`
//! - remontées worker -> coordinateur : `peregrine/node/{kind}`
//! - broadcasts du coordinateur vers les observateurs (dashboard, tests)

// Worker -> coordinateur
pub const REGISTER: &str = "peregrine/node/register";
pub const UNREGISTER: &str = "peregrine/node/unregister";
pub const METRICS: &str = "peregrine/node/metrics";
pub const HEARTBEAT: &str = "peregrine/node/heartbeat";
pub const EXECUTION_COMPLETE: &str = "peregrine/node/execution-complete";
pub const STATE_CAPTURED: &str = "peregrine/node/state-captured";

// Broadcasts
pub const TOPOLOGY: &str = "peregrine/topology";
pub const MIGRATIONS: &str = "peregrine/migrations";

/// Commandes adressées à un nœud précis.
pub mod command {
    pub const RECEIVE: &str = "receive";
    pub const EXECUTE: &str = "execute";
    pub const STOP: &str = "stop";
    pub const CAPTURE_STATE: &str = "capture-state";
    pub const FETCH: &str = "fetch";
    pub const CODE_UPLOADED: &str = "code-uploaded";
}

pub fn node_command(node_id: &str, cmd: &str) -> String {
    format!("peregrine/node/{node_id}/{cmd}")
}

/// Ack de registration et pong de heartbeat, adressés au nœud.
pub fn node_ack(node_id: &str, kind: &str) -> String {
    format!("peregrine/node/{node_id}/{kind}")
}

pub fn metrics_broadcast(node_id: &str) -> String {
    format!("peregrine/metrics/{node_id}")
}

pub fn migration_progress(migration_id: &str) -> String {
    format!("peregrine/migration/{migration_id}")
}

pub fn execution_result(code_id: &str) -> String {
    format!("peregrine/execution/{code_id}")
}

pub fn captured_state(code_id: &str) -> String {
    format!("peregrine/state/{code_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_command_topics() {
        assert_eq!(
            node_command("node-1", command::CAPTURE_STATE),
            "peregrine/node/node-1/capture-state"
        );
        assert_eq!(node_command("node-2", command::RECEIVE), "peregrine/node/node-2/receive");
    }

    #[test]
    fn broadcast_topics() {
        assert_eq!(migration_progress("m1"), "peregrine/migration/m1");
        assert_eq!(execution_result("c1"), "peregrine/execution/c1");
        assert_eq!(captured_state("c1"), "peregrine/state/c1");
    }
}
