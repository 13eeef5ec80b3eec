/**
 * BUS LISTENER - Réception MQTT côté coordinateur
 *
 * RÔLE : Consomme les remontées des workers (registration, metrics,
 * heartbeat, résultats, états capturés) et les route vers le registry et
 * l'orchestrateur. Les résultats et états sont aussi re-publiés sur des
 * topics par code pour les observateurs.
 *
 * ARCHITECTURE : Une seule task détient l'eventloop; les souscriptions
 * sont (re)posées à chaque ConnAck, ce qui couvre aussi les reconnexions.
 * Un payload invalide est loggé et jeté, jamais propagé.
 */

use crate::config::CoordinatorConfig;
use crate::orchestrator::MigrationService;
use crate::registry::NodeRegistry;
use peregrine_proto::{
    topics, EventBus, ExecutionComplete, Heartbeat, MetricsReport, NodeRegistration,
    NodeUnregister, StateCaptured,
};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

pub fn create_mqtt_client(cfg: &CoordinatorConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new("peregrine-coordinator", &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

const SUBSCRIPTIONS: [&str; 6] = [
    topics::REGISTER,
    topics::UNREGISTER,
    topics::METRICS,
    topics::HEARTBEAT,
    topics::EXECUTION_COMPLETE,
    topics::STATE_CAPTURED,
];

pub fn spawn_bus_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    registry: Arc<NodeRegistry>,
    migrations: Arc<MigrationService>,
    bus: Arc<dyn EventBus>,
) {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    println!("[bus] connected to broker");
                    for topic in SUBSCRIPTIONS {
                        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                            eprintln!("[bus] subscribe {topic} failed: {e:?}");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let topic = p.topic.clone();
                    match String::from_utf8(p.payload.to_vec()) {
                        Ok(txt) => dispatch(&topic, &txt, &registry, &migrations, &bus).await,
                        Err(_) => eprintln!("[bus] payload non UTF-8 sur {topic}"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[bus] MQTT erreur: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn dispatch(
    topic: &str,
    txt: &str,
    registry: &Arc<NodeRegistry>,
    migrations: &Arc<MigrationService>,
    bus: &Arc<dyn EventBus>,
) {
    match topic {
        t if t == topics::REGISTER => match serde_json::from_str::<NodeRegistration>(txt) {
            Ok(reg) => registry.register_node(reg).await,
            Err(_) => eprintln!("[bus] registration JSON invalide: {txt}"),
        },
        t if t == topics::UNREGISTER => match serde_json::from_str::<NodeUnregister>(txt) {
            Ok(msg) => registry.unregister_node(&msg.node_id).await,
            Err(_) => eprintln!("[bus] unregister JSON invalide: {txt}"),
        },
        t if t == topics::METRICS => match serde_json::from_str::<MetricsReport>(txt) {
            Ok(report) => registry.update_metrics(report).await,
            Err(_) => eprintln!("[bus] metrics JSON invalide: {txt}"),
        },
        t if t == topics::HEARTBEAT => match serde_json::from_str::<Heartbeat>(txt) {
            Ok(hb) => registry.touch_heartbeat(&hb.node_id).await,
            Err(_) => eprintln!("[bus] heartbeat JSON invalide: {txt}"),
        },
        t if t == topics::EXECUTION_COMPLETE => {
            match serde_json::from_str::<ExecutionComplete>(txt) {
                Ok(done) => {
                    println!(
                        "[bus] execution {} on {}: {}",
                        done.code_id, done.node_id, done.status
                    );
                    bus.publish(&topics::execution_result(&done.code_id), json!(done)).await;
                }
                Err(_) => eprintln!("[bus] execution-complete JSON invalide: {txt}"),
            }
        }
        t if t == topics::STATE_CAPTURED => match serde_json::from_str::<StateCaptured>(txt) {
            Ok(msg) => {
                let code_id = msg.code_id.clone();
                bus.publish(&topics::captured_state(&code_id), json!(msg)).await;
                migrations.save_captured_state(&code_id, msg.into_state());
            }
            Err(_) => eprintln!("[bus] state-captured JSON invalide: {txt}"),
        },
        _ => {}
    }
}
