//! Periodic liveness sweep.
//!
//! The watcher owns only the ticking task; what a sweep does is handed in
//! by the session, which evicts every connection silent for longer than the
//! heartbeat timeout.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::HubError;

/// Runs a sweep on a fixed period until stopped.
pub struct LivenessWatcher {
    period: Duration,
    cancel: Option<CancellationToken>,
}

impl LivenessWatcher {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cancel: None,
        }
    }

    /// Starts ticking. `sweep` receives the tick time and returns how many
    /// connections it evicted.
    ///
    /// The first sweep happens one full period after start.
    pub fn start<F>(&mut self, sweep: F) -> Result<(), HubError>
    where
        F: Fn(Instant) -> usize + Send + 'static,
    {
        if self.cancel.is_some() {
            return Err(HubError::WatcherAlreadyRunning);
        }
        let cancel = CancellationToken::new();
        tokio::spawn(watch(self.period, sweep, cancel.clone()));
        self.cancel = Some(cancel);
        tracing::debug!(period = ?self.period, "liveness watcher started");
        Ok(())
    }

    /// Stops ticking. No sweep runs after this returns.
    pub fn stop(&mut self) -> Result<(), HubError> {
        let cancel = self.cancel.take().ok_or(HubError::WatcherNotRunning)?;
        cancel.cancel();
        tracing::debug!("liveness watcher stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for LivenessWatcher {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

async fn watch<F>(period: Duration, sweep: F, cancel: CancellationToken)
where
    F: Fn(Instant) -> usize,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; skip it.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let evicted = sweep(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, "liveness sweep");
                }
            }
        }
    }
}
