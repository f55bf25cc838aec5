//! Calendar provider port (driven/secondary port)
//!
//! This module defines the interface to the device calendar store. The
//! store itself is opaque: on a phone it is the platform calendar database
//! reached through a native bridge, in the daemon it is the file-backed
//! store from `calsync-local`.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific;
//!   the sync layer treats every provider error as transient.
//! - Uses `#[async_trait]` for async trait methods.
//! - `update_event` and `delete_event` return `false` when the store
//!   refused the change without raising an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CalendarId, Event, EventDraft, EventId};

/// Authorization state for calendar access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Read/write access granted
    Granted,
    /// The user refused access
    Denied,
    /// The user has not been asked yet
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::Undetermined => "undetermined",
        };
        write!(f, "{}", s)
    }
}

/// A calendar available in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    /// Provider-specific calendar identifier
    pub id: CalendarId,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Whether events can be created or modified in this calendar
    #[serde(rename = "allowsModifications")]
    pub writable: bool,
}

/// Port trait for calendar store operations
///
/// ## Implementation Notes
///
/// - Implementations must not retry internally; retry policy belongs to
///   the sync orchestrator.
/// - `fetch_events` returns every event overlapping the closed range
///   `[start, end]` across all calendars.
/// - `alarm_offset_minutes` is the reminder lead time before the event start.
#[async_trait::async_trait]
pub trait ICalendarProvider: Send + Sync {
    /// Returns the current authorization state without prompting
    async fn check_permission(&self) -> anyhow::Result<PermissionStatus>;

    /// Prompts for calendar access and returns the resulting state
    async fn request_permission(&self) -> anyhow::Result<PermissionStatus>;

    /// Enumerates the calendars in the store
    async fn list_calendars(&self) -> anyhow::Result<Vec<CalendarInfo>>;

    /// Probes whether any calendar application is installed
    ///
    /// Only consulted when `list_calendars` returns nothing.
    async fn has_calendar_app(&self) -> anyhow::Result<bool>;

    /// Fetches all events overlapping `[start, end]`
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Event>>;

    /// Creates an event and returns the identifier the store assigned
    async fn create_event(
        &self,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<EventId>;

    /// Replaces the attributes of an existing event
    async fn update_event(
        &self,
        id: &EventId,
        draft: &EventDraft,
        alarm_offset_minutes: Option<u32>,
    ) -> anyhow::Result<bool>;

    /// Removes an event
    async fn delete_event(&self, id: &EventId) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_status_display() {
        assert_eq!(PermissionStatus::Granted.to_string(), "granted");
        assert_eq!(PermissionStatus::Undetermined.to_string(), "undetermined");
        assert!(PermissionStatus::Granted.is_granted());
        assert!(!PermissionStatus::Denied.is_granted());
    }

    #[test]
    fn calendar_info_uses_bridge_field_name() {
        let json = r#"{"id":"1","title":"Personal","allowsModifications":false}"#;
        let info: CalendarInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id.as_str(), "1");
        assert!(!info.writable);
    }
}
