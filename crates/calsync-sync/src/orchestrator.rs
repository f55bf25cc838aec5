//! Sync orchestrator - the sync state machine
//!
//! Every trigger (timer, foreground, manual, content change, post-mutation)
//! enters through [`SyncOrchestrator::trigger`]. The orchestrator decides
//! whether a chain may start, runs preflight checks against the provider,
//! fetches the event window, hands the result to the [`Reconciler`], and
//! retries transient failures with a linear backoff.
//!
//! ## State machine
//!
//! ```text
//!           trigger
//!   Idle ───────────→ Syncing ──→ Idle                 (committed)
//!                        │  ↺ retry wait (n × interval)
//!                        ├─────→ Error(msg)            (retries exhausted)
//!                        ├─────→ PermissionDenied
//!                        ├─────→ NoCalendarApp
//!                        └─────→ UnsupportedCalendar
//! ```
//!
//! A content change or mutation that arrives while a chain is running is
//! queued; the running chain hands over to exactly one follow-up chain
//! without passing through `Idle`, so the snapshot catches up with changes
//! its fetch may have missed.
//!
//! The UI observes the status and the committed snapshot through `watch`
//! channels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use calsync_core::{
    config::{SyncConfig, WindowPolicy},
    domain::{
        CalendarId, SkipReason, Snapshot, SyncCursor, SyncSession, SyncStatus, SyncWindow,
        TriggerSource,
    },
    ports::{ICalendarProvider, INotificationService, Notification, PermissionStatus},
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::SyncError;

/// Tunables of the orchestrator, usually taken from [`SyncConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay; the n-th retry waits `n * retry_interval`
    pub retry_interval: Duration,
    pub window_policy: WindowPolicy,
    pub window_past_days: u32,
    pub window_future_days: u32,
}

impl OrchestratorSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
            window_policy: config.window_policy,
            window_past_days: config.window_past_days,
            window_future_days: config.window_future_days,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Summary of a completed chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub source: TriggerSource,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Events in the committed snapshot
    pub total: usize,
    /// Fetch attempts used, including the successful one
    pub attempts: u32,
    pub cursor: SyncCursor,
}

/// Result of a single call to [`SyncOrchestrator::trigger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No chain was started
    Skipped(SkipReason),
    /// The snapshot was reconciled and committed
    Completed(SyncSummary),
    /// Preflight ended the chain in a state that needs user action
    Stopped(SyncStatus),
    /// Retries were exhausted
    Failed(String),
    /// The orchestrator was shut down during the chain
    Cancelled,
}

/// Owns the sync session and drives attempt chains
pub struct SyncOrchestrator {
    provider: Arc<dyn ICalendarProvider>,
    reconciler: Reconciler,
    notifier: Arc<dyn INotificationService>,
    settings: OrchestratorSettings,
    session: Mutex<SyncSession>,
    status_tx: watch::Sender<SyncStatus>,
    snapshot_tx: watch::Sender<Snapshot>,
    last_sync_tx: watch::Sender<Option<SyncCursor>>,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        provider: Arc<dyn ICalendarProvider>,
        reconciler: Reconciler,
        notifier: Arc<dyn INotificationService>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        let (snapshot_tx, _) = watch::channel(Snapshot::empty());
        let (last_sync_tx, _) = watch::channel(None);

        info!(
            max_retries = settings.max_retries,
            retry_interval_ms = settings.retry_interval.as_millis() as u64,
            window_policy = ?settings.window_policy,
            "Creating sync orchestrator"
        );

        Self {
            provider,
            reconciler,
            notifier,
            settings,
            session: Mutex::new(SyncSession::new()),
            status_tx,
            snapshot_tx,
            last_sync_tx,
            shutdown: CancellationToken::new(),
        }
    }

    // ========================================================================
    // UI-facing surface
    // ========================================================================

    /// Loads the persisted snapshot and cursor so cached events are visible
    /// before the first sync
    pub async fn restore(&self) -> Snapshot {
        let state = self.reconciler.state();
        let snapshot = state.load_snapshot().await;
        let cursor = state.load_cursor().await;

        info!(
            events = snapshot.len(),
            last_sync = ?cursor.map(|c| c.at()),
            "Restored cached snapshot"
        );

        self.snapshot_tx.send_replace(snapshot.clone());
        self.last_sync_tx.send_replace(cursor);
        snapshot
    }

    /// Last committed (or restored) snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Instant of the last successful reconciliation, if known
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync_tx.borrow().map(|c| c.at())
    }

    /// Writable calendar chosen by the last preflight
    pub fn selected_calendar(&self) -> Option<CalendarId> {
        self.lock_session().calendar_id().cloned()
    }

    /// Copy of the current session state
    pub fn session(&self) -> SyncSession {
        self.lock_session().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn trigger_manual_sync(&self) -> TriggerOutcome {
        self.trigger(TriggerSource::Manual).await
    }

    pub async fn app_foregrounded(&self) -> TriggerOutcome {
        self.trigger(TriggerSource::Foreground).await
    }

    /// Aborts pending retry waits and refuses new chains
    pub fn shutdown(&self) {
        info!("Shutting down sync orchestrator");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ========================================================================
    // Entry point
    // ========================================================================

    /// Single entry point for every sync trigger
    ///
    /// The session is checked and moved to `Syncing` before the first
    /// suspension point, so overlapping triggers observe the running chain
    /// and return [`TriggerOutcome::Skipped`]. Returns the outcome of the
    /// last chain run, including any queued follow-up.
    #[tracing::instrument(skip(self), fields(source = %source))]
    pub async fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        if self.shutdown.is_cancelled() {
            debug!("Orchestrator is shut down, ignoring trigger");
            return TriggerOutcome::Cancelled;
        }

        {
            let mut session = self.lock_session();
            if let Err(reason) = session.begin(source) {
                debug!(reason = %reason, "Sync trigger skipped");
                return TriggerOutcome::Skipped(reason);
            }
            self.status_tx.send_replace(session.status().clone());
        }

        info!("Sync started");
        let (mut outcome, mut next) = self.run_chain(source).await;
        while let Some(follow_up) = next {
            if self.shutdown.is_cancelled() {
                let mut session = self.lock_session();
                session.cancel();
                self.status_tx.send_replace(session.status().clone());
                break;
            }
            info!(follow_up = %follow_up, "Running queued follow-up sync");
            (outcome, next) = self.run_chain(follow_up).await;
        }
        outcome
    }

    /// Runs one attempt chain; also returns the source of the follow-up
    /// chain the session has already started, if any
    async fn run_chain(&self, source: TriggerSource) -> (TriggerOutcome, Option<TriggerSource>) {
        loop {
            let result = self.attempt().await;
            let retry_count = self.lock_session().retry_count();

            let err = match result {
                Ok(outcome) => return self.finish_success(source, outcome, retry_count + 1),
                Err(err) => err,
            };

            if let Some(status) = terminal_status(&err) {
                return (self.finish_stopped(status).await, None);
            }

            if !err.is_retryable() || retry_count >= self.settings.max_retries {
                return self.finish_failed(err, retry_count + 1).await;
            }

            let delay = self.settings.retry_interval * (retry_count + 1);
            warn!(
                attempt = retry_count + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Sync attempt failed, retrying"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Retry wait cancelled");
                    let mut session = self.lock_session();
                    session.cancel();
                    self.status_tx.send_replace(session.status().clone());
                    return (TriggerOutcome::Cancelled, None);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.lock_session().record_retry();
        }
    }

    /// Preflight, fetch and reconcile once
    #[tracing::instrument(skip(self))]
    async fn attempt(&self) -> Result<ReconcileOutcome, SyncError> {
        self.preflight().await?;

        let now = Utc::now();
        let window = self.fetch_window(now).await;
        debug!(start = %window.start, end = %window.end, "Fetching events");

        let remote = self
            .provider
            .fetch_events(window.start, window.end)
            .await
            .map_err(SyncError::Provider)?;

        self.reconciler.reconcile(remote, now).await
    }

    async fn preflight(&self) -> Result<(), SyncError> {
        let mut permission = self
            .provider
            .check_permission()
            .await
            .map_err(SyncError::Provider)?;

        if permission == PermissionStatus::Undetermined {
            debug!("Calendar permission undetermined, requesting");
            permission = self
                .provider
                .request_permission()
                .await
                .map_err(SyncError::Provider)?;
        }

        if !permission.is_granted() {
            return Err(SyncError::PermissionDenied);
        }

        let calendars = self
            .provider
            .list_calendars()
            .await
            .map_err(SyncError::Provider)?;

        if calendars.is_empty() {
            let has_app = self
                .provider
                .has_calendar_app()
                .await
                .map_err(SyncError::Provider)?;
            if !has_app {
                return Err(SyncError::NoCalendarApp);
            }
            warn!("No calendars reported, continuing without a selected calendar");
            self.lock_session().select_calendar(None);
            return Ok(());
        }

        let writable = calendars
            .into_iter()
            .find(|c| c.writable)
            .ok_or(SyncError::UnsupportedCalendar)?;

        debug!(calendar = %writable.id, title = %writable.title, "Selected calendar");
        self.lock_session().select_calendar(Some(writable.id));
        Ok(())
    }

    async fn fetch_window(&self, now: DateTime<Utc>) -> SyncWindow {
        let past = self.settings.window_past_days;
        let future = self.settings.window_future_days;

        match self.settings.window_policy {
            WindowPolicy::Rolling => SyncWindow::rolling(now, past, future),
            WindowPolicy::Cursor => {
                let cursor = self.reconciler.state().load_cursor().await;
                SyncWindow::since_cursor(now, cursor, past, future)
            }
        }
    }

    // ========================================================================
    // Chain endings
    // ========================================================================

    fn finish_success(
        &self,
        source: TriggerSource,
        outcome: ReconcileOutcome,
        attempts: u32,
    ) -> (TriggerOutcome, Option<TriggerSource>) {
        let summary = SyncSummary {
            source,
            added: outcome.changes.added.len(),
            updated: outcome.changes.updated.len(),
            deleted: outcome.changes.deleted.len(),
            total: outcome.snapshot.len(),
            attempts,
            cursor: outcome.cursor,
        };

        self.snapshot_tx.send_replace(outcome.snapshot);
        self.last_sync_tx.send_replace(Some(outcome.cursor));

        let next = {
            let mut session = self.lock_session();
            session.complete();
            let next = session.begin_follow_up();
            self.status_tx.send_replace(session.status().clone());
            next
        };

        info!(
            added = summary.added,
            updated = summary.updated,
            deleted = summary.deleted,
            total = summary.total,
            attempts,
            "Sync completed"
        );
        (TriggerOutcome::Completed(summary), next)
    }

    async fn finish_stopped(&self, status: SyncStatus) -> TriggerOutcome {
        warn!(status = %status, "Sync stopped by preflight");
        {
            let mut session = self.lock_session();
            session.halt(status.clone());
            self.status_tx.send_replace(session.status().clone());
        }

        let notification = match status {
            SyncStatus::PermissionDenied => Notification::error(
                "Permission Denied",
                "Calendar permission is required to sync events.",
            ),
            SyncStatus::NoCalendarApp => Notification::error(
                "No Calendar App",
                "Please install a calendar app to sync events.",
            ),
            _ => Notification::error(
                "Unsupported Calendar",
                "No calendar on this device accepts new events.",
            ),
        };
        self.notify(&notification).await;

        TriggerOutcome::Stopped(status)
    }

    async fn finish_failed(
        &self,
        err: SyncError,
        attempts: u32,
    ) -> (TriggerOutcome, Option<TriggerSource>) {
        let message = err.to_string();
        error!(attempts, error = %message, "Sync failed");
        let next = {
            let mut session = self.lock_session();
            session.fail(message.clone());
            let next = session.begin_follow_up();
            self.status_tx.send_replace(session.status().clone());
            next
        };

        self.notify(&Notification::error(
            "Sync Failed",
            format!("Failed to sync events after {attempts} attempts: {message}"),
        ))
        .await;

        (TriggerOutcome::Failed(message), next)
    }

    async fn notify(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(title = %notification.title, error = %e, "Failed to deliver notification");
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, SyncSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps preflight errors to the status that ends the chain without retry
fn terminal_status(err: &SyncError) -> Option<SyncStatus> {
    match err {
        SyncError::PermissionDenied => Some(SyncStatus::PermissionDenied),
        SyncError::NoCalendarApp => Some(SyncStatus::NoCalendarApp),
        SyncError::UnsupportedCalendar => Some(SyncStatus::UnsupportedCalendar),
        _ => None,
    }
}
