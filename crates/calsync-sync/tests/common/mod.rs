//! Shared test doubles for calsync-sync integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use calsync_core::domain::{CalendarId, Event, EventDraft, EventId};
use calsync_core::ports::{
    CalendarInfo, ICalendarProvider, IKeyValueStore, INotificationService, Notification,
    PermissionStatus,
};
use calsync_sync::orchestrator::{OrchestratorSettings, SyncOrchestrator};
use calsync_sync::reconcile::Reconciler;
use calsync_sync::state_store::SyncStateStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

// ============================================================================
// Calendar provider
// ============================================================================

pub struct MockProvider {
    pub permission: Mutex<PermissionStatus>,
    pub permission_after_request: Mutex<PermissionStatus>,
    pub calendars: Mutex<Vec<CalendarInfo>>,
    pub has_app: AtomicBool,
    pub events: Mutex<Vec<Event>>,
    /// Number of upcoming fetches that fail
    pub fetch_failures: AtomicU32,
    pub fetch_delay: Mutex<Duration>,
    pub fail_mutations: AtomicBool,
    pub refuse_mutations: AtomicBool,

    pub permission_checks: AtomicU32,
    pub permission_requests: AtomicU32,
    pub fetch_calls: AtomicU32,
    /// Clock reading at the start of every fetch
    pub fetch_times: Mutex<Vec<tokio::time::Instant>>,
    pub mutation_calls: AtomicU32,
    pub last_window: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    pub last_alarm: Mutex<Option<u32>>,
    next_id: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            permission: Mutex::new(PermissionStatus::Granted),
            permission_after_request: Mutex::new(PermissionStatus::Granted),
            calendars: Mutex::new(vec![calendar("personal", true)]),
            has_app: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
            fetch_failures: AtomicU32::new(0),
            fetch_delay: Mutex::new(Duration::ZERO),
            fail_mutations: AtomicBool::new(false),
            refuse_mutations: AtomicBool::new(false),
            permission_checks: AtomicU32::new(0),
            permission_requests: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            fetch_times: Mutex::new(Vec::new()),
            mutation_calls: AtomicU32::new(0),
            last_window: Mutex::new(None),
            last_alarm: Mutex::new(None),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let provider = Self::new();
        provider.set_events(events);
        provider
    }

    pub fn set_events(&self, events: Vec<Event>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *self.permission.lock().unwrap() = status;
    }

    pub fn set_calendars(&self, calendars: Vec<CalendarInfo>) {
        *self.calendars.lock().unwrap() = calendars;
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn fetches(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Time between consecutive fetches
    pub fn fetch_gaps(&self) -> Vec<Duration> {
        let times = self.fetch_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait::async_trait]
impl ICalendarProvider for MockProvider {
    async fn check_permission(&self) -> anyhow::Result<PermissionStatus> {
        self.permission_checks.fetch_add(1, Ordering::SeqCst);
        Ok(*self.permission.lock().unwrap())
    }

    async fn request_permission(&self) -> anyhow::Result<PermissionStatus> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let granted = *self.permission_after_request.lock().unwrap();
        *self.permission.lock().unwrap() = granted;
        Ok(granted)
    }

    async fn list_calendars(&self) -> anyhow::Result<Vec<CalendarInfo>> {
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn has_calendar_app(&self) -> anyhow::Result<bool> {
        Ok(self.has_app.load(Ordering::SeqCst))
    }

    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Event>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_times.lock().unwrap().push(tokio::time::Instant::now());
        *self.last_window.lock().unwrap() = Some((start, end));

        // the result is read before the delay, like a store query whose
        // response is still in transit
        let events: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.overlaps(start, end))
            .cloned()
            .collect();

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("connection reset by peer"));
        }

        Ok(events)
    }

    async fn create_event(
        &self,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<EventId> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(anyhow!("calendar is read-only"));
        }
        *self.last_alarm.lock().unwrap() = alarm_offset_minutes;

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = EventId::new(format!("created-{n}"))?;
        self.events
            .lock()
            .unwrap()
            .push(draft.clone().into_event(id.clone()));
        Ok(id)
    }

    async fn update_event(
        &self,
        id: &EventId,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<bool> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(anyhow!("calendar is read-only"));
        }
        if self.refuse_mutations.load(Ordering::SeqCst) {
            return Ok(false);
        }
        *self.last_alarm.lock().unwrap() = alarm_offset_minutes;

        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| &e.id == id) {
            Some(slot) => {
                *slot = draft.clone().into_event(id.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_event(&self, id: &EventId) -> anyhow::Result<bool> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(anyhow!("calendar is read-only"));
        }
        if self.refuse_mutations.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| &e.id != id);
        Ok(events.len() < before)
    }
}

// ============================================================================
// Key-value store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub values: Mutex<HashMap<String, String>>,
    pub fail_writes: AtomicBool,
    pub writes: AtomicU32,
}

impl MemoryStore {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(key, value);
        Ok(())
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl INotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_settings(provider, fast_settings())
    }

    pub fn with_settings(provider: MockProvider, settings: OrchestratorSettings) -> Self {
        Self::with_store(provider, Arc::new(MemoryStore::default()), settings)
    }

    pub fn with_store(
        provider: MockProvider,
        store: Arc<MemoryStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let provider = Arc::new(provider);
        let notifier = Arc::new(RecordingNotifier::default());
        let state = SyncStateStore::new(store.clone());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            provider.clone(),
            Reconciler::new(state),
            notifier.clone(),
            settings,
        ));
        Self {
            provider,
            store,
            notifier,
            orchestrator,
        }
    }
}

/// Default settings with millisecond retry waits
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry_interval: Duration::from_millis(5),
        ..OrchestratorSettings::default()
    }
}

pub fn calendar(id: &str, writable: bool) -> CalendarInfo {
    CalendarInfo {
        id: CalendarId::new(id.to_string()).unwrap(),
        title: id.to_string(),
        writable,
    }
}

/// Event starting `hours_from_now` hours from now, lasting one hour
pub fn event(id: &str, title: &str, hours_from_now: i64) -> Event {
    let start = Utc::now() + ChronoDuration::hours(hours_from_now);
    Event::new(
        EventId::new(id.to_string()).unwrap(),
        title,
        start,
        start + ChronoDuration::hours(1),
    )
}

/// Polls `cond` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
