//! Background services with an explicit start/stop lifecycle.
//!
//! Each service runs one [`PeriodicTask`] on a fixed interval until its shutdown channel
//! flips. A failing tick is logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tenderbridge_core::{ApplicationError, AwardJobWorker, TenderLifecycleService};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Upper bound on jobs one worker tick processes before yielding back to the interval.
pub const WORKER_BATCH_SIZE: usize = 32;

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn tick(&self) -> Result<(), ApplicationError>;
}

pub struct AwardWorkerTask {
    worker: Arc<AwardJobWorker>,
}

impl AwardWorkerTask {
    pub fn new(worker: Arc<AwardJobWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl PeriodicTask for AwardWorkerTask {
    fn name(&self) -> &'static str {
        "award_worker"
    }

    /// The worker logs each outcome itself.
    async fn tick(&self) -> Result<(), ApplicationError> {
        self.worker.drain(WORKER_BATCH_SIZE).await?;
        Ok(())
    }
}

pub struct ScheduledTransitionTask {
    lifecycle: Arc<TenderLifecycleService>,
}

impl ScheduledTransitionTask {
    pub fn new(lifecycle: Arc<TenderLifecycleService>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl PeriodicTask for ScheduledTransitionTask {
    fn name(&self) -> &'static str {
        "scheduled_transitions"
    }

    async fn tick(&self) -> Result<(), ApplicationError> {
        self.lifecycle.run_scheduled_transitions().await?;
        Ok(())
    }
}

pub struct ServiceHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the loop and waits up to `grace` for the current tick to finish.
    /// Returns the number of completed ticks, or `None` when the task had to be aborted.
    pub async fn stop(self, grace: Duration) -> Option<u64> {
        let _ = self.shutdown.send(true);
        let abort = self.join.abort_handle();
        match tokio::time::timeout(grace, self.join).await {
            Ok(Ok(ticks)) => {
                info!(event_name = "system.service.stopped", service = self.name, ticks, "stopped");
                Some(ticks)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "system.service.join_failed",
                    service = self.name,
                    error = %error,
                    "service task ended abnormally"
                );
                None
            }
            Err(_) => {
                abort.abort();
                warn!(
                    event_name = "system.service.aborted",
                    service = self.name,
                    grace_ms = grace.as_millis() as u64,
                    "service did not stop within the grace period"
                );
                None
            }
        }
    }
}

pub fn start(task: Arc<dyn PeriodicTask>, every: Duration) -> ServiceHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let name = task.name();

    let join = tokio::spawn(async move {
        info!(
            event_name = "system.service.started",
            service = name,
            interval_ms = every.as_millis() as u64,
            "background service started"
        );
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0_u64;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(error) = task.tick().await {
                        warn!(
                            event_name = "system.service.tick_failed",
                            service = name,
                            retryable = error.is_retryable(),
                            error = %error,
                            "background tick failed"
                        );
                    }
                    ticks += 1;
                }
            }
        }
        ticks
    });

    ServiceHandle { name, shutdown, join }
}
