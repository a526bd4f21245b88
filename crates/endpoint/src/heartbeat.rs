//! Heartbeat pump: periodic liveness beats to the hub.

use std::time::Duration;

use tether_link::Peer;
use tether_protocol::{Envelope, Kind};
use tokio_util::sync::CancellationToken;

/// Sends a `heartbeat` envelope to `hub` every `period` until cancelled.
///
/// No acknowledgment is expected. The pump also stops once the hub can no
/// longer be reached.
pub async fn heartbeat_pump(hub: Peer, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = hub.send(Envelope::new(Kind::Heartbeat)) {
                    tracing::debug!(hub = %hub.id(), "heartbeat pump stopping: {e}");
                    break;
                }
                tracing::trace!(hub = %hub.id(), "heartbeat sent");
            }
        }
    }
}
