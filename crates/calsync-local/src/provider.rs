//! File-backed calendar provider (secondary/driven adapter)
//!
//! Implements [`ICalendarProvider`] over a [`CalendarDocument`] stored as
//! JSON at a fixed path.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: the document is written to a sibling temp file and
//!   renamed over the store, so readers never observe a partial document.
//! - **Missing store**: a missing file means no calendar application is
//!   installed. Reads return empty results and writes fail.
//! - **Serialized mutations**: read-modify-write cycles hold an async lock
//!   so concurrent mutations from one process do not lose updates.

use std::path::{Path, PathBuf};

use calsync_core::{
    domain::{CalendarId, Event, EventDraft, EventId},
    ports::{CalendarInfo, ICalendarProvider, PermissionStatus},
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::document::{Alarm, CalendarDocument, StoredEvent};
use crate::LocalStoreError;

/// Calendar provider backed by a JSON file
#[derive(Debug)]
pub struct LocalCalendarProvider {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalCalendarProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the store with one writable calendar if it does not exist
    ///
    /// Returns true if a new store was written.
    pub async fn initialize(&self, calendar_title: &str) -> Result<bool, LocalStoreError> {
        let _guard = self.write_lock.lock().await;
        if self.read_document().await?.is_some() {
            return Ok(false);
        }

        let document = CalendarDocument {
            permission: PermissionStatus::Undetermined,
            calendars: vec![CalendarInfo {
                id: CalendarId::new(Uuid::new_v4().to_string())?,
                title: calendar_title.to_string(),
                writable: true,
            }],
            events: Vec::new(),
        };
        self.write_document(&document).await?;
        Ok(true)
    }

    /// Reads the store; `None` if the file does not exist
    pub async fn read_document(&self) -> Result<Option<CalendarDocument>, LocalStoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| LocalStoreError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Replaces the store atomically via temp file + rename
    #[instrument(skip(self, document), fields(path = %self.path.display(), events = document.events.len()))]
    pub async fn write_document(&self, document: &CalendarDocument) -> Result<(), LocalStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(document).map_err(|e| LocalStoreError::Malformed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tmp_path = {
            let mut p = self.path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        debug!(?tmp_path, "writing to temporary file");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("calendar store written");
        Ok(())
    }

    async fn require_document(&self) -> Result<CalendarDocument, LocalStoreError> {
        self.read_document()
            .await?
            .ok_or_else(|| LocalStoreError::NotFound(self.path.clone()))
    }

    /// Loads the store for a mutation, checking access
    async fn writable_document(&self) -> Result<CalendarDocument, LocalStoreError> {
        let document = self.require_document().await?;
        if !document.permission.is_granted() {
            return Err(LocalStoreError::AccessDenied);
        }
        Ok(document)
    }
}

/// Resolves the calendar a draft should land in
fn target_calendar(
    document: &CalendarDocument,
    requested: Option<&CalendarId>,
) -> Result<CalendarId, LocalStoreError> {
    let calendar = match requested {
        Some(id) => document
            .calendar(id)
            .ok_or_else(|| LocalStoreError::NotWritable(format!("unknown calendar {id}")))?,
        None => document
            .default_calendar()
            .ok_or_else(|| LocalStoreError::NotWritable("no writable calendar".to_string()))?,
    };

    if !calendar.writable {
        return Err(LocalStoreError::NotWritable(calendar.id.to_string()));
    }
    Ok(calendar.id.clone())
}

fn alarms_for(alarm_offset_minutes: Option<u32>) -> Vec<Alarm> {
    alarm_offset_minutes.map(Alarm::before).into_iter().collect()
}

#[async_trait::async_trait]
impl ICalendarProvider for LocalCalendarProvider {
    async fn check_permission(&self) -> anyhow::Result<PermissionStatus> {
        // Nothing to protect without a store.
        Ok(self
            .read_document()
            .await?
            .map(|d| d.permission)
            .unwrap_or(PermissionStatus::Granted))
    }

    async fn request_permission(&self) -> anyhow::Result<PermissionStatus> {
        let _guard = self.write_lock.lock().await;
        let Some(mut document) = self.read_document().await? else {
            return Ok(PermissionStatus::Granted);
        };

        if document.permission == PermissionStatus::Undetermined {
            document.permission = PermissionStatus::Granted;
            self.write_document(&document).await?;
            debug!("calendar access granted");
        }
        Ok(document.permission)
    }

    async fn list_calendars(&self) -> anyhow::Result<Vec<CalendarInfo>> {
        Ok(self
            .read_document()
            .await?
            .map(|d| d.calendars)
            .unwrap_or_default())
    }

    async fn has_calendar_app(&self) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    #[instrument(skip(self))]
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Event>> {
        let Some(document) = self.read_document().await? else {
            return Ok(Vec::new());
        };
        if !document.permission.is_granted() {
            return Err(LocalStoreError::AccessDenied.into());
        }

        let events: Vec<Event> = document
            .events
            .into_iter()
            .map(|stored| stored.event)
            .filter(|e| e.overlaps(start, end))
            .collect();

        debug!(count = events.len(), "fetched events");
        Ok(events)
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create_event(
        &self,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<EventId> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.writable_document().await?;
        let calendar_id = target_calendar(&document, draft.calendar_id.as_ref())?;

        let id = EventId::new(Uuid::new_v4().to_string())?;
        document.events.push(StoredEvent {
            event: draft.clone().into_event(id.clone()),
            calendar_id: Some(calendar_id),
            alarms: alarms_for(alarm_offset_minutes),
        });
        self.write_document(&document).await?;

        debug!(id = %id, "event created");
        Ok(id)
    }

    #[instrument(skip(self, draft), fields(id = %id))]
    async fn update_event(
        &self,
        id: &EventId,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.writable_document().await?;

        let Some(index) = document.events.iter().position(|s| &s.event.id == id) else {
            debug!("event not found");
            return Ok(false);
        };

        let current = document.events[index].calendar_id.clone();
        let requested = draft.calendar_id.as_ref().or(current.as_ref());
        let calendar_id = match target_calendar(&document, requested) {
            Ok(calendar_id) => calendar_id,
            Err(e) => {
                debug!(error = %e, "update refused");
                return Ok(false);
            }
        };

        document.events[index] = StoredEvent {
            event: draft.clone().into_event(id.clone()),
            calendar_id: Some(calendar_id),
            alarms: alarms_for(alarm_offset_minutes),
        };
        self.write_document(&document).await?;

        debug!("event updated");
        Ok(true)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_event(&self, id: &EventId) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.writable_document().await?;

        let before = document.events.len();
        document.events.retain(|s| &s.event.id != id);
        if document.events.len() == before {
            debug!("event not found");
            return Ok(false);
        }

        self.write_document(&document).await?;
        debug!("event deleted");
        Ok(true)
    }
}
