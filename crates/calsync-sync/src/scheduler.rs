//! Sync scheduler - turns timer ticks and external signals into sync triggers
//!
//! The [`SyncScheduler`] owns the periodic timer and the receiving end of the
//! trigger channel. Every trigger is dispatched into
//! [`SyncOrchestrator::trigger`] as a tracked task, so a trigger that arrives
//! while a chain is running reaches the orchestrator's guard and is skipped.
//!
//! ## Flow
//!
//! ```text
//! interval tick ─────────────┐
//! SchedulerHandle ─→ mpsc ───┼─→ SyncScheduler ─→ JoinSet ─→ SyncOrchestrator::trigger
//! CalendarChangeWatcher ─────┘
//! ```
//!
//! Cancelling the scheduler's token stops the loop, shuts the orchestrator
//! down (aborting retry waits) and aborts any tracked task. Dropping every
//! [`SchedulerHandle`] stops the loop after in-flight tasks finish.

use std::sync::Arc;
use std::time::Duration;

use calsync_core::domain::TriggerSource;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{SyncOrchestrator, TriggerOutcome};

/// Capacity of the trigger channel; a full channel means a sync is pending
const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// A sync request coming from outside the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// User asked for a sync
    Manual,
    /// Application returned to the foreground
    Foreground,
    /// The calendar store changed
    ContentChange,
}

impl SyncTrigger {
    pub fn source(self) -> TriggerSource {
        match self {
            SyncTrigger::Manual => TriggerSource::Manual,
            SyncTrigger::Foreground => TriggerSource::Foreground,
            SyncTrigger::ContentChange => TriggerSource::ContentChange,
        }
    }
}

/// Cloneable sender half used to request syncs
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SyncTrigger>,
}

impl SchedulerHandle {
    /// Queues a trigger; returns false if the scheduler has stopped
    pub async fn send(&self, trigger: SyncTrigger) -> bool {
        match self.tx.send(trigger).await {
            Ok(()) => true,
            Err(_) => {
                debug!(?trigger, "Scheduler stopped, dropping trigger");
                false
            }
        }
    }

    /// Queues a trigger without waiting
    ///
    /// Returns false if the channel is full or closed. Usable from
    /// non-async contexts such as the `notify` callback thread.
    pub fn try_send(&self, trigger: SyncTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(?trigger, "Trigger channel full, a sync is already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn request_sync(&self) -> bool {
        info!("User-initiated sync requested");
        self.send(SyncTrigger::Manual).await
    }

    pub async fn app_foregrounded(&self) -> bool {
        self.send(SyncTrigger::Foreground).await
    }

    pub fn calendar_changed(&self) -> bool {
        self.try_send(SyncTrigger::ContentChange)
    }
}

/// Periodic and on-demand sync trigger loop
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    trigger_rx: mpsc::Receiver<SyncTrigger>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    tasks: JoinSet<TriggerOutcome>,
}

impl SyncScheduler {
    /// Creates a scheduler and the handle used to feed it
    ///
    /// Cancelling `shutdown` tears the scheduler and the orchestrator down.
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> (Self, SchedulerHandle) {
        let (tx, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        info!(
            poll_ms = poll_interval.as_millis() as u64,
            "Creating sync scheduler"
        );

        let scheduler = Self {
            orchestrator,
            trigger_rx,
            poll_interval,
            shutdown,
            tasks: JoinSet::new(),
        };

        (scheduler, SchedulerHandle { tx })
    }

    /// Main loop; the first timer tick fires immediately
    pub async fn run(mut self) {
        info!("Sync scheduler starting");

        let mut timer = tokio::time::interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancelled = loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping scheduler");
                    break true;
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    log_outcome(joined);
                }

                _ = timer.tick() => {
                    self.dispatch(TriggerSource::Timer);
                }

                trigger = self.trigger_rx.recv() => match trigger {
                    Some(trigger) => self.dispatch(trigger.source()),
                    None => {
                        info!("Trigger channel closed, scheduler shutting down");
                        break false;
                    }
                },
            }
        };

        if cancelled {
            self.orchestrator.shutdown();
            self.tasks.shutdown().await;
        } else {
            while let Some(joined) = self.tasks.join_next().await {
                log_outcome(joined);
            }
        }

        info!("Sync scheduler stopped");
    }

    fn dispatch(&mut self, source: TriggerSource) {
        debug!(source = %source, in_flight = self.tasks.len(), "Dispatching sync trigger");
        let orchestrator = Arc::clone(&self.orchestrator);
        self.tasks
            .spawn(async move { orchestrator.trigger(source).await });
    }
}

fn log_outcome(joined: Result<TriggerOutcome, JoinError>) {
    match joined {
        Ok(TriggerOutcome::Completed(summary)) => {
            debug!(source = %summary.source, total = summary.total, "Sync task completed");
        }
        Ok(TriggerOutcome::Skipped(reason)) => debug!(reason = %reason, "Sync task skipped"),
        Ok(TriggerOutcome::Stopped(status)) => warn!(status = %status, "Sync task stopped"),
        Ok(TriggerOutcome::Failed(message)) => warn!(error = %message, "Sync task failed"),
        Ok(TriggerOutcome::Cancelled) => debug!("Sync task cancelled"),
        Err(e) if e.is_cancelled() => debug!("Sync task aborted"),
        Err(e) => error!(error = %e, "Sync task panicked"),
    }
}
