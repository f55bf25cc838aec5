//! On-disk layout of the calendar store
//!
//! ```json
//! {
//!   "permission": "granted",
//!   "calendars": [{ "id": "1", "title": "Personal", "allowsModifications": true }],
//!   "events": [{
//!     "id": "…", "title": "Standup",
//!     "startDate": "2024-05-01T09:00:00Z", "endDate": "2024-05-01T09:15:00Z",
//!     "calendarId": "1", "alarms": [{ "relativeOffset": -30 }]
//!   }]
//! }
//! ```

use calsync_core::domain::{CalendarId, Event};
use calsync_core::ports::{CalendarInfo, PermissionStatus};
use serde::{Deserialize, Serialize};

/// Reminder attached to a stored event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Minutes relative to the event start; negative means before
    #[serde(rename = "relativeOffset")]
    pub relative_offset: i64,
}

impl Alarm {
    /// Alarm firing `minutes` before the event start
    pub fn before(minutes: u32) -> Self {
        Self {
            relative_offset: -i64::from(minutes),
        }
    }
}

/// An event as kept in the store, with its calendar and alarms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(rename = "calendarId", default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<CalendarId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alarms: Vec<Alarm>,
}

/// The whole calendar store file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDocument {
    #[serde(default = "default_permission")]
    pub permission: PermissionStatus,
    #[serde(default)]
    pub calendars: Vec<CalendarInfo>,
    #[serde(default)]
    pub events: Vec<StoredEvent>,
}

fn default_permission() -> PermissionStatus {
    PermissionStatus::Undetermined
}

impl Default for CalendarDocument {
    fn default() -> Self {
        Self {
            permission: default_permission(),
            calendars: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl CalendarDocument {
    /// Finds a calendar by id
    pub fn calendar(&self, id: &CalendarId) -> Option<&CalendarInfo> {
        self.calendars.iter().find(|c| &c.id == id)
    }

    /// First calendar that accepts modifications
    pub fn default_calendar(&self) -> Option<&CalendarInfo> {
        self.calendars.iter().find(|c| c.writable)
    }
}
