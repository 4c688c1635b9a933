// monitor.rs — Background sweep that marks expired leases.
//
// Expiry is always computed at check time, so the monitor is bookkeeping
// only: it stamps `expired_marked_at_ms` so operators can see which leases
// lapsed and when. Deleting them is `CredentialStore::purge_inactive_leases`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::credential::now_ms;
use crate::error::CredentialError;
use crate::store::CredentialStore;

pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Leases marked expired by this sweep.
    pub newly_marked: usize,
    /// Leases still active after it.
    pub active: usize,
}

#[derive(Debug, Clone)]
pub struct LeaseMonitor {
    store: Arc<CredentialStore>,
    period: Duration,
}

impl LeaseMonitor {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            period: DEFAULT_SWEEP_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One synchronous sweep. Writes the store only if a lease was marked.
    pub fn sweep_once(&self) -> Result<SweepReport, CredentialError> {
        let now = now_ms();
        let newly_marked = self.store.mark_expired_leases(now)?;
        let active = self
            .store
            .read(|creds| creds.iter().map(|c| c.active_lease_count(now)).sum::<usize>())?;
        Ok(SweepReport {
            newly_marked,
            active,
        })
    }

    /// Run the sweep every period on the current tokio runtime until the
    /// returned handle is shut down. Sweep errors are logged and the loop
    /// carries on.
    pub fn spawn(self) -> LeaseMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::new(self);

        let task = tokio::spawn(async move {
            tracing::info!(period_ms = monitor.period.as_millis() as u64, "lease monitor started");
            let mut tick = interval(monitor.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let sweeper = Arc::clone(&monitor);
                        match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                            Ok(Ok(report)) if report.newly_marked > 0 => {
                                tracing::info!(
                                    newly_marked = report.newly_marked,
                                    active = report.active,
                                    "lease sweep marked expired leases"
                                );
                            }
                            Ok(Ok(report)) => {
                                tracing::debug!(active = report.active, "lease sweep found nothing new");
                            }
                            Ok(Err(e)) => tracing::warn!(error = %e, "lease sweep failed"),
                            Err(e) => tracing::warn!(error = %e, "lease sweep task failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("lease monitor stopped");
        });

        LeaseMonitorHandle { shutdown_tx, task }
    }
}

/// Handle to a running [`LeaseMonitor`].
#[derive(Debug)]
pub struct LeaseMonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LeaseMonitorHandle {
    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "lease monitor task ended abnormally");
        }
    }
}
