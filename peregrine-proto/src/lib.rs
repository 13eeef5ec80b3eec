/**
 * PEREGRINE PROTO - Contrat de communication coordinateur <-> workers
 *
 * RÔLE : Définit tout ce qui transite sur le bus MQTT : structures de
 * messages, schéma des topics, et l'interface de publication one-way.
 *
 * ARCHITECTURE : Les deux binaires (coordinateur et agent) dépendent de
 * cette crate; aucun des deux ne dépend de l'autre. Le bus est
 * fire-and-forget : publier ne bloque jamais et ne confirme jamais.
 */

pub mod bus;
pub mod messages;
pub mod topics;

pub use bus::{EventBus, MqttBus};
pub use messages::*;

/// Timestamp epoch en millisecondes, pour les payloads de messages.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
