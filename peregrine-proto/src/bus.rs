//! Interface de publication one-way sur le bus.
//!
//! Contrat at-most-once : `publish` ne bloque pas, ne réessaie pas, et ne
//! rend jamais d'erreur à l'appelant. Un échec de transport est loggé et
//! avalé — les publishers ne savent jamais si la livraison a réussi.
//! Toute interaction requête/réponse passe par un topic de retour dédié,
//! jamais par cette interface.

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde_json::Value;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value);
}

/// Implémentation MQTT via rumqttc. `try_publish` garantit le non-blocage :
/// si la file du client est pleine, le message est perdu (et loggé).
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Value) {
        let body = payload.to_string();
        if let Err(e) = self.client.try_publish(topic, QoS::AtLeastOnce, false, body) {
            eprintln!("[bus] publish on {topic} dropped: {e}");
        }
    }
}
