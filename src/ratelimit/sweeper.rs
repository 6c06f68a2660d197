//! Background removal of expired counters.
//!
//! Lazy expiry on read decides correctness; the sweeper only bounds memory
//! for keys that are never read again after their window ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::backend::CounterBackend;
use crate::error::{GateError, Result};

/// Handle to a running sweep task.
///
/// Call [`CounterSweeper::stop`] for an orderly shutdown. Dropping the handle
/// aborts the task, so it can never outlive its owner.
#[derive(Debug)]
pub struct CounterSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CounterSweeper {
    /// Spawn the sweep task on the current Tokio runtime.
    pub fn start(store: Arc<dyn CounterBackend>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(GateError::Config("sweep interval must be positive".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GateError::Config(format!("counter sweeper needs a Tokio runtime: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(sweep_loop(store, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis() as u64, "Counter sweeper started");

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Whether the sweep task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Counter sweeper did not exit cleanly");
            }
        }
        info!("Counter sweeper stopped");
    }
}

impl Drop for CounterSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sweep_loop(
    store: Arc<dyn CounterBackend>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Counter sweeper received shutdown");
                break;
            }
            _ = ticker.tick() => {
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(
                        removed = removed,
                        tracked = store.tracked_keys(),
                        "Swept expired counters"
                    );
                } else {
                    trace!("Sweep found no expired counters");
                }
            }
        }
    }
}
