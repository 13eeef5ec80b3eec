/**
 * PEREGRINE COORDINATOR - Point d'entrée du coordinateur de migrations
 *
 * RÔLE : Bootstrap complet : config, client MQTT, registry de nœuds,
 * orchestrateur de migrations, API REST.
 *
 * ARCHITECTURE : Event-driven via MQTT (remontées des workers) + API REST
 * (pilotage humain). Tout l'état vit en mémoire, rien ne survit au
 * redémarrage.
 */

mod bus;
mod config;
mod http;
mod models;
mod orchestrator;
mod registry;
mod state;
mod store;

use crate::config::load_config;
use crate::http::AppState;
use crate::orchestrator::{MigrationService, MigrationSettings};
use crate::registry::NodeRegistry;
use crate::store::{CodeStore, MigrationStore};
use peregrine_proto::{EventBus, MqttBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    let cfg = load_config().await;
    println!(
        "[coordinator] broker {}:{}, http port {}",
        cfg.mqtt.host, cfg.mqtt.port, cfg.http_port
    );

    let (client, eventloop) = bus::create_mqtt_client(&cfg);
    let event_bus: Arc<dyn EventBus> = Arc::new(MqttBus::new(client.clone()));

    let registry = Arc::new(NodeRegistry::new(event_bus.clone()));
    let migrations = MigrationService::new(
        registry.clone(),
        CodeStore::new(),
        MigrationStore::new(),
        event_bus.clone(),
        MigrationSettings {
            pacing: Duration::from_millis(cfg.migration.pacing_ms),
            capture_wait: Duration::from_millis(cfg.migration.capture_wait_ms),
        },
    );

    bus::spawn_bus_listener(client, eventloop, registry.clone(), migrations.clone(), event_bus);

    let app = http::build_router(AppState { registry, migrations });
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    println!("[coordinator] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
