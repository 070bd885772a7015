//! Realtime stock event stream
//!
//! Server events go to stdout as JSON lines, lifecycle messages to stderr.
//! While listening, the outbox drains automatically whenever the backend
//! becomes reachable.

use super::Workspace;
use anyhow::{anyhow, Result};
use depot_common::ANY_TOPIC;
use depot_core::SyncEvent;
use depot_realtime::events::{
    TOPIC_CONNECTED, TOPIC_DISCONNECTED, TOPIC_GAVE_UP, TOPIC_RECONNECT_SCHEDULED,
};
use depot_realtime::{ChannelConfig, ChannelEvent, RealtimeChannel, WsConnector};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn cmd_listen(offline: bool, events: Option<Vec<String>>) -> Result<()> {
    let workspace = Workspace::open()?;

    if !offline {
        workspace.context.on("drain_completed", |event| {
            if let SyncEvent::DrainCompleted(report) = event {
                eprintln!(
                    "↻ Synced {}/{} pending mutations",
                    report.succeeded, report.total
                );
            }
        });
        workspace.context.initialize(Arc::new(workspace.probe()?));
    }

    let channel = RealtimeChannel::spawn(
        ChannelConfig::from(&workspace.config.realtime),
        Arc::new(WsConnector),
    )?;

    let topics = events.unwrap_or_else(|| vec![ANY_TOPIC.to_string()]);
    for topic in &topics {
        channel.on(topic, |event| {
            if let ChannelEvent::Server { name, data } = event {
                println!("{}", json!({ "event": name, "data": data }));
            }
        });
    }

    channel.on(TOPIC_CONNECTED, |_| eprintln!("✓ Connected"));
    channel.on(TOPIC_DISCONNECTED, |event| {
        if let ChannelEvent::Disconnected { reason } = event {
            eprintln!("⚠ Disconnected: {}", reason);
        }
    });
    channel.on(TOPIC_RECONNECT_SCHEDULED, |event| {
        if let ChannelEvent::ReconnectScheduled { attempt, delay } = event {
            eprintln!("  reconnecting in {:?} (attempt {})", delay, attempt);
        }
    });

    let (gave_up_tx, mut gave_up) = mpsc::unbounded_channel();
    channel.on(TOPIC_GAVE_UP, move |event| {
        if let ChannelEvent::GaveUp { attempts } = event {
            let _ = gave_up_tx.send(*attempts);
        }
    });

    eprintln!("Listening on {} (Ctrl+C to stop)", channel.url());
    channel.connect().await?;

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(()),
        attempts = gave_up.recv() => Err(anyhow!(
            "realtime channel gave up after {} reconnect attempts",
            attempts.unwrap_or_default()
        )),
    };

    channel.shutdown().await;
    workspace.context.shutdown();
    result
}
