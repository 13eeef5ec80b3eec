/*!
Mock du bus d'événements pour développement sans broker

Implémente `EventBus` en mémoire : chaque publication est enregistrée et
consultable par topic pour les assertions de tests. Comme le vrai bus,
`publish` ne bloque jamais et ne rend jamais d'erreur.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use peregrine_proto::EventBus;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Value,
}

#[derive(Clone, Default)]
pub struct MockBus {
    published: Arc<Mutex<Vec<MockMessage>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tous les messages publiés, dans l'ordre de publication.
    pub fn published(&self) -> Vec<MockMessage> {
        self.published.lock().clone()
    }

    /// Payloads publiés sur un topic donné, dans l'ordre.
    pub fn find_by_topic(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Parse le dernier message d'un topic vers un type concret.
    pub fn last_json<T>(&self, topic: &str) -> anyhow::Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_by_topic(topic).last() {
            Some(payload) => Ok(Some(serde_json::from_value(payload.clone())?)),
            None => Ok(None),
        }
    }

    /// Attend (par polling) qu'au moins un message apparaisse sur un topic.
    pub async fn wait_for(&self, topic: &str, timeout_ms: u64) -> Option<Value> {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(payload) = self.find_by_topic(topic).last() {
                return Some(payload.clone());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        log::warn!("timeout waiting for message on {topic}");
        None
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl EventBus for MockBus {
    async fn publish(&self, topic: &str, payload: Value) {
        log::debug!("[mock-bus] publish {topic}");
        self.published.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_published_messages_in_order() {
        let bus = MockBus::new();
        bus.publish("a", serde_json::json!({"n": 1})).await;
        bus.publish("b", serde_json::json!({"n": 2})).await;
        bus.publish("a", serde_json::json!({"n": 3})).await;

        assert_eq!(bus.published().len(), 3);
        let on_a = bus.find_by_topic("a");
        assert_eq!(on_a.len(), 2);
        assert_eq!(on_a[1]["n"], 3);
    }

    #[tokio::test]
    async fn last_json_parses_typed_payloads() {
        let bus = MockBus::new();
        bus.publish(
            peregrine_proto::topics::HEARTBEAT,
            serde_json::json!({"nodeId": "node-1"}),
        )
        .await;

        let hb: Option<peregrine_proto::Heartbeat> =
            bus.last_json(peregrine_proto::topics::HEARTBEAT).unwrap();
        assert_eq!(hb.unwrap().node_id, "node-1");
    }
}
