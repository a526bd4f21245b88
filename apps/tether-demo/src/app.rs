//! Wires a hub and its endpoints together over the in-process transport.

use std::time::Duration;

use tether_endpoint::{EndpointEvent, EndpointSession};
use tether_hub::{HubEvent, HubSession};
use tether_link::memory;
use tether_protocol::{Category, Envelope};
use tokio::sync::mpsc;

use crate::config::Config;

const ECHO: &str = "echo";

/// Runs the demo until the configured time elapses or Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // -- Hub --
    let (hub_port, hub_mailbox) = memory::port(config.hub_identity.as_str());
    let hub = HubSession::new(config.hub(), hub_mailbox)?;

    hub.on(Category::Connection, |event| {
        if let HubEvent::Connection(conn) = event {
            tracing::info!(peer = %conn.id(), "hub: endpoint joined");
            if let Err(e) = conn.send("welcome") {
                tracing::warn!(peer = %conn.id(), "hub: greeting failed: {e}");
            }
        }
    })?;
    hub.on(Category::Disconnected, |event| {
        if let HubEvent::Disconnected { id, reason } = event {
            tracing::info!(peer = %id, %reason, "hub: endpoint left");
        }
    })?;
    hub.on(Category::Message, |event| {
        if let HubEvent::Message { from, body, .. } = event {
            tracing::info!(peer = %from.id(), %body, "hub: message");
        }
    })?;
    hub.on_kind(ECHO, |tap| {
        let Some(reply) = &tap.reply else {
            return;
        };
        match Envelope::with_body(ECHO, &tap.envelope.body) {
            Ok(answer) => {
                if let Err(e) = reply.send(answer) {
                    tracing::debug!(peer = %tap.from, "echo reply dropped: {e}");
                }
            }
            Err(e) => tracing::warn!("echo body not serializable: {e}"),
        }
    })?;
    hub.listen()?;

    // -- Endpoints --
    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let mut endpoints = Vec::with_capacity(config.endpoints);
    for n in 0..config.endpoints {
        let id = format!("endpoint-{n}");
        let (port, mailbox) = memory::port(id.as_str());
        let endpoint = EndpointSession::new(config.endpoint(), port.connect(&hub_port), mailbox)?;

        let tx = connected_tx.clone();
        let name = id.clone();
        endpoint.on(Category::Connected, move |_| {
            let _ = tx.send(name.clone());
        })?;
        let name = id.clone();
        endpoint.on(Category::Message, move |event| {
            if let EndpointEvent::Message { body, .. } = event {
                tracing::info!(endpoint = %name, %body, "endpoint: message");
            }
        })?;
        let name = id.clone();
        endpoint.on(Category::Disconnected, move |event| {
            if let EndpointEvent::Disconnected { reason } = event {
                tracing::info!(endpoint = %name, %reason, "endpoint: dropped by hub");
            }
        })?;

        endpoint.listen()?;
        endpoints.push(endpoint);
    }
    drop(connected_tx);

    for _ in 0..config.endpoints {
        if let Some(id) = connected_rx.recv().await {
            tracing::debug!(endpoint = %id, "handshake complete");
        }
    }
    tracing::info!(connections = hub.connections().len(), "all endpoints connected");

    // -- Request/reply --
    if let Some(first) = endpoints.first() {
        let question = Envelope::with_body(ECHO, &serde_json::json!({ "text": "ping" }))?;
        match first.ask(question).await {
            Ok(reply) => tracing::info!(body = %reply.body, "endpoint-0: echo answered"),
            Err(e) => tracing::warn!("endpoint-0: echo failed: {e}"),
        }
    }

    // -- Eviction --
    // The last endpoint goes quiet; the hub drops it after the timeout.
    if let [_, .., last] = endpoints.as_slice() {
        last.close()?;
        tracing::info!("last endpoint stopped heartbeating");
    }

    // -- Wait for shutdown --
    let deadline = config.run_for();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl-C, shutting down");
        }
        _ = sleep_or_forever(deadline) => {
            tracing::info!("run time elapsed, shutting down");
        }
    }

    for endpoint in &endpoints {
        if endpoint.is_listening() {
            endpoint.close()?;
        }
    }
    hub.close()?;
    Ok(())
}

async fn sleep_or_forever(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
