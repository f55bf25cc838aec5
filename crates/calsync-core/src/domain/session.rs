//! SyncSession domain entity
//!
//! This module defines the SyncSession value which tracks the state of
//! the synchronization state machine: the current status, how many
//! retries the current attempt chain has used, whether the last chain
//! ended in an error, and which calendar was selected during preflight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::CalendarId;

/// Status of the synchronization state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No sync in progress
    Idle,
    /// An attempt chain is running (including retry waits)
    Syncing,
    /// Retries were exhausted; carries the last failure message
    Error(String),
    /// Calendar access has not been granted
    PermissionDenied,
    /// No calendars and no calendar application on the device
    NoCalendarApp,
    /// Calendars exist but none accepts modifications
    UnsupportedCalendar,
}

impl SyncStatus {
    /// Returns true while an attempt chain is in flight
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }

    /// Returns true for states that need user or environment action
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            SyncStatus::Error(_)
                | SyncStatus::PermissionDenied
                | SyncStatus::NoCalendarApp
                | SyncStatus::UnsupportedCalendar
        )
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Idle
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error(msg) => write!(f, "error: {}", msg),
            SyncStatus::PermissionDenied => write!(f, "permission-denied"),
            SyncStatus::NoCalendarApp => write!(f, "no-calendar-app"),
            SyncStatus::UnsupportedCalendar => write!(f, "unsupported-calendar"),
        }
    }
}

/// What caused a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Periodic timer tick
    Timer,
    /// Application returned to the foreground
    Foreground,
    /// Explicit user request
    Manual,
    /// The calendar store reported a content change
    ContentChange,
    /// Follow-up pass after a successful create/update/delete
    Mutation,
}

impl TriggerSource {
    /// Automatic sources are suppressed while the error flag is set
    pub fn is_automatic(&self) -> bool {
        matches!(self, TriggerSource::Timer | TriggerSource::ContentChange)
    }

    /// Sources whose change may postdate the fetch of a running chain, so
    /// they queue one more pass instead of being dropped
    pub fn queues_follow_up(&self) -> bool {
        matches!(self, TriggerSource::ContentChange | TriggerSource::Mutation)
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerSource::Timer => "timer",
            TriggerSource::Foreground => "foreground",
            TriggerSource::Manual => "manual",
            TriggerSource::ContentChange => "content_change",
            TriggerSource::Mutation => "mutation",
        };
        write!(f, "{}", s)
    }
}

/// Why a trigger did not start an attempt chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another chain is already running
    AlreadySyncing,
    /// Another chain is running; one more pass will follow it
    Queued,
    /// The previous chain failed and the trigger was automatic
    SuppressedAfterError,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadySyncing => write!(f, "already syncing"),
            SkipReason::Queued => write!(f, "queued behind running sync"),
            SkipReason::SuppressedAfterError => write!(f, "suppressed after error"),
        }
    }
}

/// State of the sync state machine
///
/// Owned by the orchestrator; all transitions go through the methods
/// below so that the status, retry counter and error flag stay consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSession {
    status: SyncStatus,
    retry_count: u32,
    had_error: bool,
    calendar_id: Option<CalendarId>,
    last_trigger: Option<TriggerSource>,
    started_at: Option<DateTime<Utc>>,
    follow_up: Option<TriggerSource>,
}

impl SyncSession {
    /// Creates an idle session
    pub fn new() -> Self {
        Self {
            status: SyncStatus::Idle,
            retry_count: 0,
            had_error: false,
            calendar_id: None,
            last_trigger: None,
            started_at: None,
            follow_up: None,
        }
    }

    // --- Getters ---

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// Writable calendar chosen by the last preflight
    pub fn calendar_id(&self) -> Option<&CalendarId> {
        self.calendar_id.as_ref()
    }

    pub fn last_trigger(&self) -> Option<TriggerSource> {
        self.last_trigger
    }

    /// When the current (or last) attempt chain started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Source of the pass queued behind the running chain
    pub fn follow_up(&self) -> Option<TriggerSource> {
        self.follow_up
    }

    // --- Transitions ---

    /// Starts a new attempt chain
    ///
    /// Fails if a chain is already running, or if the previous chain failed
    /// and `source` is automatic. While a chain runs, sources that
    /// [queue a follow-up](TriggerSource::queues_follow_up) record one
    /// pending pass; repeated requests collapse into it. Non-automatic
    /// sources clear the error flag.
    pub fn begin(&mut self, source: TriggerSource) -> Result<(), SkipReason> {
        if self.status.is_syncing() {
            if source.queues_follow_up() {
                // a mutation outranks a content change as the recorded source
                if self.follow_up != Some(TriggerSource::Mutation) {
                    self.follow_up = Some(source);
                }
                return Err(SkipReason::Queued);
            }
            return Err(SkipReason::AlreadySyncing);
        }
        if self.had_error && source.is_automatic() {
            return Err(SkipReason::SuppressedAfterError);
        }
        self.start(source);
        Ok(())
    }

    /// Starts the queued pass right after the running chain ended
    ///
    /// Must be called after [`complete`](Self::complete) or
    /// [`fail`](Self::fail) while the caller still holds the session, so no
    /// other chain can start in between. Returns the source of the new chain,
    /// or `None` if nothing was queued or the error flag suppresses it.
    pub fn begin_follow_up(&mut self) -> Option<TriggerSource> {
        let source = self.follow_up.take()?;
        if self.status.is_syncing() || (self.had_error && source.is_automatic()) {
            return None;
        }
        self.start(source);
        Some(source)
    }

    fn start(&mut self, source: TriggerSource) {
        self.had_error = false;
        self.status = SyncStatus::Syncing;
        self.retry_count = 0;
        self.last_trigger = Some(source);
        self.started_at = Some(Utc::now());
    }

    /// Records one retry of the running chain and returns the new count
    pub fn record_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Records the calendar selected by preflight
    pub fn select_calendar(&mut self, calendar_id: Option<CalendarId>) {
        self.calendar_id = calendar_id;
    }

    /// Ends the chain successfully
    pub fn complete(&mut self) {
        self.status = SyncStatus::Idle;
        self.retry_count = 0;
        self.had_error = false;
    }

    /// Ends the chain in a terminal preflight state (no retry)
    ///
    /// Drops any queued pass: the stop needs user or environment action, so
    /// an immediate rerun would stop the same way.
    pub fn halt(&mut self, status: SyncStatus) {
        debug_assert!(status.needs_attention());
        self.status = status;
        self.follow_up = None;
    }

    /// Ends the chain after retries were exhausted
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error(message.into());
        self.had_error = true;
    }

    /// Ends the chain because the owner is shutting down
    pub fn cancel(&mut self) {
        self.status = SyncStatus::Idle;
        self.retry_count = 0;
        self.follow_up = None;
    }
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_idle() {
        let session = SyncSession::new();
        assert_eq!(session.status(), &SyncStatus::Idle);
        assert_eq!(session.retry_count(), 0);
        assert!(!session.had_error());
        assert!(session.started_at().is_none());
    }

    #[test]
    fn begin_rejects_concurrent_chain() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();
        assert!(session.status().is_syncing());

        assert_eq!(
            session.begin(TriggerSource::Manual),
            Err(SkipReason::AlreadySyncing)
        );
        assert_eq!(session.last_trigger(), Some(TriggerSource::Timer));
    }

    #[test]
    fn begin_resets_retry_count() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Manual).unwrap();
        session.record_retry();
        session.record_retry();
        session.complete();

        session.begin(TriggerSource::Timer).unwrap();
        assert_eq!(session.retry_count(), 0);
    }

    #[test]
    fn error_flag_suppresses_automatic_triggers_only() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();
        session.fail("provider unavailable");
        assert!(session.had_error());

        assert_eq!(
            session.begin(TriggerSource::Timer),
            Err(SkipReason::SuppressedAfterError)
        );
        assert_eq!(
            session.begin(TriggerSource::ContentChange),
            Err(SkipReason::SuppressedAfterError)
        );
        assert_eq!(
            session.status(),
            &SyncStatus::Error("provider unavailable".into())
        );

        session.begin(TriggerSource::Foreground).unwrap();
        assert!(!session.had_error());
        assert!(session.status().is_syncing());
    }

    #[test]
    fn halt_does_not_set_error_flag() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();
        session.halt(SyncStatus::PermissionDenied);
        assert!(!session.had_error());
        assert!(session.status().needs_attention());

        // Timer may retry the preflight once permission is granted
        assert!(session.begin(TriggerSource::Timer).is_ok());
    }

    #[test]
    fn complete_clears_retry_state() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Manual).unwrap();
        assert_eq!(session.record_retry(), 1);
        session.complete();
        assert_eq!(session.status(), &SyncStatus::Idle);
        assert_eq!(session.retry_count(), 0);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Manual).unwrap();
        session.record_retry();
        session.cancel();
        assert_eq!(session.status(), &SyncStatus::Idle);
        assert_eq!(session.retry_count(), 0);
    }

    #[test]
    fn overlapping_mutation_queues_one_follow_up() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();

        assert_eq!(
            session.begin(TriggerSource::ContentChange),
            Err(SkipReason::Queued)
        );
        assert_eq!(session.begin(TriggerSource::Mutation), Err(SkipReason::Queued));
        assert_eq!(session.begin(TriggerSource::ContentChange), Err(SkipReason::Queued));
        assert_eq!(session.follow_up(), Some(TriggerSource::Mutation));

        session.complete();
        assert_eq!(session.begin_follow_up(), Some(TriggerSource::Mutation));
        assert!(session.status().is_syncing());
        assert_eq!(session.last_trigger(), Some(TriggerSource::Mutation));

        session.complete();
        assert_eq!(session.begin_follow_up(), None);
        assert_eq!(session.status(), &SyncStatus::Idle);
    }

    #[test]
    fn failed_chain_suppresses_automatic_follow_up() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();
        assert_eq!(
            session.begin(TriggerSource::ContentChange),
            Err(SkipReason::Queued)
        );

        session.fail("provider unavailable");
        assert_eq!(session.begin_follow_up(), None);
        assert!(session.had_error());
        assert!(session.follow_up().is_none());
    }

    #[test]
    fn halt_and_cancel_drop_follow_up() {
        let mut session = SyncSession::new();
        session.begin(TriggerSource::Timer).unwrap();
        let _ = session.begin(TriggerSource::Mutation);
        session.halt(SyncStatus::PermissionDenied);
        assert_eq!(session.begin_follow_up(), None);

        session.begin(TriggerSource::Manual).unwrap();
        let _ = session.begin(TriggerSource::Mutation);
        session.cancel();
        assert_eq!(session.begin_follow_up(), None);
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::Idle.to_string(), "idle");
        assert_eq!(SyncStatus::Error("boom".into()).to_string(), "error: boom");
        assert_eq!(
            SyncStatus::UnsupportedCalendar.to_string(),
            "unsupported-calendar"
        );
        assert_eq!(TriggerSource::ContentChange.to_string(), "content_change");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::NoCalendarApp).unwrap();
        assert_eq!(json, "\"no_calendar_app\"");
    }
}
