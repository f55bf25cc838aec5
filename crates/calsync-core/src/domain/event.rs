//! Calendar event entity
//!
//! The provider is the source of truth for events; locally held copies
//! are a cache. Events are persisted as JSON using the field names the
//! calendar bridge produces (`startDate`, `endDate`), so snapshots written
//! by earlier app revisions still decode.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{CalendarId, EventId};

/// A calendar event as reported by the provider
///
/// Equality is structural over every attribute; the reconciliation engine
/// relies on it to detect updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-assigned identifier (reconciliation key)
    pub id: EventId,
    /// Event title
    pub title: String,
    /// Start instant
    #[serde(rename = "startDate")]
    pub start: DateTime<Utc>,
    /// End instant (not validated against `start`)
    #[serde(rename = "endDate")]
    pub end: DateTime<Utc>,
    /// Optional free-form location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Optional notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Event {
    /// Creates an event with no location or notes
    pub fn new(
        id: EventId,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            start,
            end,
            location: None,
            notes: None,
        }
    }

    /// Sets the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Snapshot ordering: ascending start instant, then id
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Returns true if the event overlaps the closed window `[from, to]`
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start <= to && self.end.max(self.start) >= from
    }
}

/// Attributes supplied by the user when creating or updating an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Event title
    pub title: String,
    /// Start instant
    pub start: DateTime<Utc>,
    /// End instant
    pub end: DateTime<Utc>,
    /// Optional location
    pub location: Option<String>,
    /// Optional notes
    pub notes: Option<String>,
    /// Target calendar; `None` uses the provider's default calendar
    pub calendar_id: Option<CalendarId>,
}

impl EventDraft {
    /// Creates a draft with only the required fields set
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            location: None,
            notes: None,
            calendar_id: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn in_calendar(mut self, calendar_id: CalendarId) -> Self {
        self.calendar_id = Some(calendar_id);
        self
    }

    /// Materializes the draft as an event with the given id
    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            title: self.title,
            start: self.start,
            end: self.end,
            location: self.location,
            notes: self.notes,
        }
    }
}
