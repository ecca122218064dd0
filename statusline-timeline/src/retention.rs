//! Periodic removal of old, closed intervals.
//!
//! Only intervals that ended before the cutoff are removed. Those always form
//! a prefix of a monitor's timeline, so what remains stays contiguous and
//! keeps its open interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use statusline_core::errors::Result;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::TimelineStore;

pub struct RetentionSweeper {
    store: Arc<dyn TimelineStore>,
    retention: chrono::Duration,
    interval: Duration,
}

/// Running sweeper; dropping it leaves the task running until shutdown.
pub struct RetentionHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            error!("retention sweeper crashed: {:?}", err);
        }
    }
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        retention: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    pub async fn sweep_once(&self) -> Result<u64> {
        self.sweep_before(Utc::now() - self.retention).await
    }

    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let purged = self.store.purge_closed_before(cutoff).await?;
        if purged > 0 {
            info!(purged, %cutoff, "purged expired status timelines");
        } else {
            debug!(%cutoff, "no expired status timelines");
        }
        Ok(purged)
    }

    /// Sweeps immediately and then every `interval` until shut down.
    pub fn spawn(self) -> RetentionHandle {
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("retention sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_once().await {
                            error!(error = %err, "retention sweep failed");
                        }
                    }
                }
            }
        });

        RetentionHandle { shutdown, task }
    }
}
