//! Periodic invitation expiry sweep

use crate::config::SweepConfig;
use crate::invitation_manager::InvitationManager;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use waypoint_storage::CollabStorage;
use waypoint_types::CollabResult;

/// Drives [`InvitationManager::sweep_expired`] on a fixed interval
pub struct ExpirySweeper<S: ?Sized> {
    invitations: InvitationManager<S>,
    config: SweepConfig,
}

impl<S> ExpirySweeper<S>
where
    S: CollabStorage + ?Sized,
{
    pub fn new(invitations: InvitationManager<S>, config: SweepConfig) -> Self {
        Self {
            invitations,
            config,
        }
    }

    /// One sweep; returns how many invitations were expired
    pub async fn run_once(&self) -> CollabResult<usize> {
        self.invitations.sweep_expired().await
    }

    /// Sweep every `interval_secs` until `shutdown` turns true or its sender
    /// is dropped. Failed sweeps are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("Expiry sweeper disabled");
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.config.interval_secs, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(count) => tracing::debug!(count, "Expiry sweep finished"),
                        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
