//! Peregrine Agent - worker node for the code migration testbed
//!
//! The agent joins the fleet over MQTT and from then on is driven
//! entirely by the coordinator:
//! - registers itself and reports metrics and heartbeats on timers
//! - stores and executes code packages on command
//! - captures and ships execution state for strong migrations
//!
//! Connection handling is deliberately simple: one event loop, flat
//! retry delay, re-registration on every ConnAck so a broker restart
//! heals on its own.

mod commands;
mod config;
mod metrics;
mod sandbox;

use anyhow::Result;
use commands::CommandContext;
use config::AgentConfig;
use metrics::MetricsSampler;
use peregrine_proto::{
    topics, topics::command, CaptureStateCommand, CodePackage, EventBus, ExecuteCommand,
    Heartbeat, MqttBus, NodeRegistration, NodeUnregister, StopCommand,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const COMMAND_TOPICS: [&str; 5] = [
    command::RECEIVE,
    command::EXECUTE,
    command::STOP,
    command::CAPTURE_STATE,
    command::CODE_UPLOADED,
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AgentConfig::from_env();
    info!(node_id = %cfg.node_id, broker = %format!("{}:{}", cfg.broker_host, cfg.broker_port), "starting agent");

    let mut opts = MqttOptions::new(
        format!("peregrine-agent-{}", cfg.node_id),
        &cfg.broker_host,
        cfg.broker_port,
    );
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);

    let bus: Arc<dyn EventBus> = Arc::new(MqttBus::new(client.clone()));
    let ctx = Arc::new(CommandContext::new(cfg.node_id.clone(), bus.clone()));
    let mut sampler = MetricsSampler::new();

    let mut metrics_tick = interval(Duration::from_secs(cfg.metrics_interval_secs));
    let mut heartbeat_tick = interval(Duration::from_secs(cfg.heartbeat_interval_secs));

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to broker, registering");
                    for cmd in COMMAND_TOPICS {
                        let topic = topics::node_command(&cfg.node_id, cmd);
                        if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                            error!(topic = %topic, "subscribe failed: {e}");
                        }
                    }
                    bus.publish(
                        topics::REGISTER,
                        json!(NodeRegistration {
                            id: cfg.node_id.clone(),
                            host: cfg.host.clone(),
                            port: cfg.port,
                        }),
                    )
                    .await;
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    dispatch(&ctx, &p.topic, &p.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("broker connection lost: {e}");
                    tokio::time::sleep(Duration::from_secs(cfg.reconnect_delay_secs)).await;
                }
            },
            _ = metrics_tick.tick() => {
                let report = sampler.sample(&cfg.node_id);
                bus.publish(topics::METRICS, json!(report)).await;
            }
            _ = heartbeat_tick.tick() => {
                bus.publish(topics::HEARTBEAT, json!(Heartbeat { node_id: cfg.node_id.clone() })).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down, unregistering");
                // best effort, the coordinator also survives a silent exit
                bus.publish(topics::UNREGISTER, json!(NodeUnregister { node_id: cfg.node_id.clone() })).await;
                break;
            }
        }
    }
    Ok(())
}

/// Routes a command by its topic suffix. Executions run on their own
/// task so a long script never starves the event loop.
fn dispatch(ctx: &Arc<CommandContext>, topic: &str, payload: &[u8]) {
    let Some(cmd) = topic.rsplit('/').next() else { return };
    let txt = match std::str::from_utf8(payload) {
        Ok(t) => t.to_owned(),
        Err(_) => {
            warn!(topic = %topic, "non UTF-8 payload dropped");
            return;
        }
    };

    match cmd {
        command::RECEIVE => match serde_json::from_str::<CodePackage>(&txt) {
            Ok(pkg) => ctx.on_receive(pkg),
            Err(e) => warn!("invalid code package: {e}"),
        },
        command::EXECUTE => match serde_json::from_str::<ExecuteCommand>(&txt) {
            Ok(c) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.on_execute(c).await });
            }
            Err(e) => warn!("invalid execute command: {e}"),
        },
        command::STOP => match serde_json::from_str::<StopCommand>(&txt) {
            Ok(c) => ctx.on_stop(c),
            Err(e) => warn!("invalid stop command: {e}"),
        },
        command::CAPTURE_STATE => match serde_json::from_str::<CaptureStateCommand>(&txt) {
            Ok(c) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.on_capture_state(c).await });
            }
            Err(e) => warn!("invalid capture-state command: {e}"),
        },
        command::CODE_UPLOADED => match serde_json::from_str::<CodePackage>(&txt) {
            Ok(pkg) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.on_code_uploaded(pkg).await });
            }
            Err(e) => warn!("invalid uploaded package: {e}"),
        },
        other => debug!(command = %other, "unhandled topic"),
    }
}
