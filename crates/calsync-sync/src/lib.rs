//! Calsync Sync - Snapshot reconciliation engine
//!
//! Provides:
//! - Diffing of a fetched event set against the cached snapshot
//! - Atomic persistence of the snapshot together with the sync cursor
//! - A sync state machine with preflight checks and bounded retry
//! - Trigger scheduling (timer, foreground, manual, content change)
//! - Event mutations followed by a reconciliation pass
//!
//! ## Modules
//!
//! - [`reconcile`] - Pure diff plus the commit of a reconciled snapshot
//! - [`state_store`] - Snapshot and cursor records on top of the key-value port
//! - [`orchestrator`] - Sync state machine and the UI-facing surface
//! - [`scheduler`] - Trigger loop feeding the orchestrator
//! - [`watcher`] - Calendar store change detection
//! - [`mutation`] - Create/update/delete through the provider

pub mod mutation;
pub mod orchestrator;
pub mod reconcile;
pub mod scheduler;
pub mod state_store;
pub mod watcher;

use calsync_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Calendar access was not granted
    #[error("Calendar permission denied")]
    PermissionDenied,

    /// No calendars and no calendar application
    #[error("No calendar app found on the device")]
    NoCalendarApp,

    /// Calendars exist but none accepts modifications
    #[error("No writable calendar available")]
    UnsupportedCalendar,

    /// The calendar provider failed; treated as transient
    #[error("Calendar provider error: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// Writing sync state failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The provider rejected a create, update or delete
    #[error("Mutation failed: {0}")]
    MutationFailed(String),

    /// A domain-level error propagated from calsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Returns true for failures the orchestrator retries
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Provider(_) | SyncError::Persistence(_))
    }
}
