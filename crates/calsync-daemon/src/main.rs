//! calsync Daemon - Background calendar synchronization service
//!
//! This binary runs as a user service and handles:
//! - Periodic reconciliation of the cached snapshot with the calendar store
//! - Syncs on calendar store changes (file watcher)
//! - Manual syncs on SIGUSR1
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite state store and the file-backed calendar
//! provider into a `SyncOrchestrator`, then hands it to a `SyncScheduler`.
//! Everything is tied to a `CancellationToken` that is triggered on
//! receipt of SIGTERM or SIGINT.
//!
//! The configuration file is taken from `--config`, then `$CALSYNC_CONFIG`,
//! then the platform default path. `--once` runs a single sync and exits;
//! the `event` subcommands create, update or delete one event and sync.

mod notifier;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use calsync_cache::{DatabasePool, SqliteKeyValueStore};
use calsync_core::config::Config;
use calsync_core::domain::{CalendarId, EventDraft, EventId};
use calsync_local::LocalCalendarProvider;
use calsync_sync::{
    mutation::EventMutationService,
    orchestrator::{OrchestratorSettings, SyncOrchestrator, TriggerOutcome},
    reconcile::Reconciler,
    scheduler::{SchedulerHandle, SyncScheduler},
    state_store::SyncStateStore,
    watcher::CalendarChangeWatcher,
};
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::notifier::LogNotificationService;

/// Environment variable overriding the configuration file path
const CONFIG_ENV: &str = "CALSYNC_CONFIG";

/// Title of the calendar created in a fresh store
const DEFAULT_CALENDAR_TITLE: &str = "Calendar";

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "calsyncd", version, about = "Calendar sync daemon")]
struct Args {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON regardless of the config file
    #[arg(long)]
    json: bool,

    /// Run a single sync and exit
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Change one calendar event, then sync and exit
    #[command(subcommand)]
    Event(EventCommand),
}

#[derive(Debug, Subcommand)]
enum EventCommand {
    /// Create an event
    Add(EventFields),
    /// Replace the attributes of an event
    Update {
        /// Provider id of the event
        id: String,
        #[command(flatten)]
        fields: EventFields,
    },
    /// Delete an event
    Delete {
        /// Provider id of the event
        id: String,
    },
}

#[derive(Debug, ClapArgs)]
struct EventFields {
    /// Event title
    title: String,

    /// Start instant (RFC 3339)
    #[arg(long)]
    start: DateTime<Utc>,

    /// End instant (RFC 3339)
    #[arg(long)]
    end: DateTime<Utc>,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Target calendar id; the first writable calendar if omitted
    #[arg(long)]
    calendar: Option<String>,
}

impl EventFields {
    fn into_draft(self) -> Result<EventDraft> {
        let mut draft = EventDraft::new(self.title, self.start, self.end);
        if let Some(location) = self.location {
            draft = draft.with_location(location);
        }
        if let Some(notes) = self.notes {
            draft = draft.with_notes(notes);
        }
        if let Some(calendar) = self.calendar {
            draft = draft.in_calendar(CalendarId::new(calendar)?);
        }
        Ok(draft)
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the adapters and the orchestrator for the lifetime of the process
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    orchestrator: Arc<SyncOrchestrator>,
    mutations: EventMutationService,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Validates the configuration, opens the database and builds the
    /// orchestrator
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            for err in &errors {
                error!(field = %err.field, message = %err.message, "Invalid configuration");
            }
            anyhow::bail!("Configuration has {} error(s)", errors.len());
        }

        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open state database")?;
        let store = Arc::new(SqliteKeyValueStore::new(db_pool.pool().clone()));

        let provider = Arc::new(LocalCalendarProvider::new(
            config.provider.calendar_file.clone(),
        ));
        if config.provider.create_if_missing
            && provider
                .initialize(DEFAULT_CALENDAR_TITLE)
                .await
                .context("Failed to create calendar store")?
        {
            info!(path = %provider.path().display(), "Created empty calendar store");
        }

        let orchestrator = Arc::new(SyncOrchestrator::new(
            provider.clone(),
            Reconciler::new(SyncStateStore::new(store)),
            Arc::new(LogNotificationService),
            OrchestratorSettings::from_config(&config.sync),
        ));
        let mutations = EventMutationService::new(
            provider,
            Arc::clone(&orchestrator),
            config.sync.reminder_minutes,
        );

        Ok(Self {
            config,
            db_pool,
            orchestrator,
            mutations,
            shutdown,
        })
    }

    /// Restores the cached snapshot and runs one manual sync
    async fn run_once(self) -> Result<()> {
        self.orchestrator.restore().await;

        let outcome = self.orchestrator.trigger_manual_sync().await;
        self.orchestrator.shutdown();
        self.db_pool.close().await;

        match outcome {
            TriggerOutcome::Completed(summary) => {
                info!(
                    added = summary.added,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    total = summary.total,
                    "Sync finished"
                );
                Ok(())
            }
            TriggerOutcome::Skipped(reason) => {
                info!(reason = %reason, "Sync skipped");
                Ok(())
            }
            TriggerOutcome::Stopped(status) => anyhow::bail!("Sync stopped: {status}"),
            TriggerOutcome::Failed(message) => anyhow::bail!("Sync failed: {message}"),
            TriggerOutcome::Cancelled => anyhow::bail!("Sync cancelled"),
        }
    }

    /// Applies one event change; the mutation service syncs afterwards
    ///
    /// A sync runs first so an undetermined permission is requested before
    /// the mutation checks it.
    async fn run_event_command(self, command: EventCommand) -> Result<()> {
        self.orchestrator.restore().await;
        if let TriggerOutcome::Stopped(status) = self.orchestrator.trigger_manual_sync().await {
            warn!(status = %status, "Initial sync stopped");
        }

        let result = match command {
            EventCommand::Add(fields) => {
                let draft = fields.into_draft()?;
                self.mutations.create(&draft).await.map(|id| {
                    info!(id = %id, "Event created");
                    println!("{id}");
                })
            }
            EventCommand::Update { id, fields } => {
                let draft = fields.into_draft()?;
                self.mutations.update(&EventId::new(id)?, &draft).await
            }
            EventCommand::Delete { id } => self.mutations.delete(&EventId::new(id)?).await,
        };

        self.orchestrator.shutdown();
        self.db_pool.close().await;
        result.context("Event change failed")
    }

    /// Runs until the shutdown token is cancelled
    async fn run(self) -> Result<()> {
        self.orchestrator.restore().await;

        let (scheduler, handle) = SyncScheduler::new(
            Arc::clone(&self.orchestrator),
            self.config.sync.poll_interval(),
            self.shutdown.child_token(),
        );

        let _watcher = if self.config.provider.watch_changes {
            match CalendarChangeWatcher::start(&self.config.provider.calendar_file, handle.clone())
            {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Calendar watcher unavailable, relying on timer");
                    None
                }
            }
        } else {
            None
        };

        let scheduler_task = tokio::spawn(scheduler.run());
        let signal_task = tokio::spawn(manual_sync_signal(handle, self.shutdown.clone()));
        let status_task = tokio::spawn(log_status_changes(
            Arc::clone(&self.orchestrator),
            self.shutdown.clone(),
        ));

        info!(
            poll_interval = self.config.sync.poll_interval,
            calendar = %self.config.provider.calendar_file.display(),
            "Daemon running"
        );

        self.shutdown.cancelled().await;

        scheduler_task.await.context("Scheduler task failed")?;
        signal_task.abort();
        status_task.abort();
        self.db_pool.close().await;

        Ok(())
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

/// Requests a manual sync on every SIGUSR1
#[cfg(unix)]
async fn manual_sync_signal(handle: SchedulerHandle, token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGUSR1 handler, manual sync disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            received = usr1.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGUSR1, requesting sync");
                if !handle.request_sync().await {
                    break;
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn manual_sync_signal(_handle: SchedulerHandle, token: CancellationToken) {
    token.cancelled().await;
}

/// Logs every status transition of the orchestrator
async fn log_status_changes(orchestrator: Arc<SyncOrchestrator>, token: CancellationToken) {
    let mut status_rx = orchestrator.subscribe_status();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if status.needs_attention() {
                    warn!(status = %status, "Sync needs attention");
                } else {
                    debug!(status = %status, "Sync status changed");
                }
            }
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

fn config_path(args: &Args) -> PathBuf {
    args.config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(Config::default_path)
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let path = config_path(&args);
    let mut config = Config::load_or_default(&path);
    if args.json {
        config.logging.json = true;
    }

    init_tracing(&config);

    info!(config = %path.display(), "calsync daemon starting (calsyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = match args.command {
        Some(Command::Event(command)) => service.run_event_command(command).await,
        None if args.once => service.run_once().await,
        None => service.run().await,
    };

    match &result {
        Ok(()) => info!("calsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "calsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use calsync_core::config::ConfigBuilder;
    use calsync_core::domain::SyncStatus;

    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        ConfigBuilder::new()
            .provider_calendar_file(dir.join("calendar.json"))
            .provider_watch_changes(false)
            .provider_create_if_missing(true)
            .storage_database(dir.join("state").join("calsync.db"))
            .sync_poll_interval(3600)
            .build()
    }

    #[test]
    fn test_cancellation_token_child_propagation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_config_default_poll_interval() {
        let config = Config::default();
        assert_eq!(config.sync.poll_interval().as_secs(), 120);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["calsyncd", "--config", "/tmp/c.yaml", "--once"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(args.once);
        assert!(!args.json);
        assert_eq!(config_path(&args), PathBuf::from("/tmp/c.yaml"));
    }

    #[tokio::test]
    async fn test_run_once_syncs_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = DaemonService::new(test_config(dir.path()), CancellationToken::new())
            .await
            .unwrap();
        let orchestrator = Arc::clone(&service.orchestrator);

        service.run_once().await.unwrap();
        assert!(orchestrator.last_sync().is_some());
        assert!(orchestrator.snapshot().is_empty());
    }

    #[test]
    fn test_event_add_args_parse() {
        let args = Args::parse_from([
            "calsyncd",
            "event",
            "add",
            "Dentist",
            "--start",
            "2024-05-01T09:00:00Z",
            "--end",
            "2024-05-01T10:00:00Z",
            "--location",
            "Main St",
        ]);
        let Some(Command::Event(EventCommand::Add(fields))) = args.command else {
            panic!("expected event add");
        };
        let draft = fields.into_draft().unwrap();
        assert_eq!(draft.title, "Dentist");
        assert_eq!(draft.location.as_deref(), Some("Main St"));
        assert!(draft.end > draft.start);
    }

    #[tokio::test]
    async fn test_event_add_uses_configured_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sync.reminder_minutes = 45;

        let service = DaemonService::new(config, CancellationToken::new())
            .await
            .unwrap();
        let orchestrator = Arc::clone(&service.orchestrator);

        let start = Utc::now() + chrono::Duration::hours(1);
        let fields = EventFields {
            title: "Dentist".into(),
            start,
            end: start + chrono::Duration::hours(1),
            location: None,
            notes: None,
            calendar: None,
        };
        service
            .run_event_command(EventCommand::Add(fields))
            .await
            .unwrap();

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.events()[0].title, "Dentist");

        let raw = std::fs::read_to_string(dir.path().join("calendar.json")).unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["events"][0]["alarms"][0]["relativeOffset"], -45);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sync.poll_interval = 0;

        let result = DaemonService::new(config, CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_daemon_syncs_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();

        let service = DaemonService::new(test_config(dir.path()), token.clone())
            .await
            .unwrap();
        let orchestrator = Arc::clone(&service.orchestrator);
        assert!(dir.path().join("calendar.json").exists());

        let run = tokio::spawn(service.run());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while orchestrator.last_sync().is_none() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(orchestrator.last_sync().is_some());
        assert_eq!(orchestrator.status(), SyncStatus::Idle);
        assert!(orchestrator.selected_calendar().is_some());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(orchestrator.is_shut_down());
    }
}
