//! Local snapshot, sync cursor and fetch window
//!
//! The snapshot is the cached, canonically ordered event list shown to the
//! user. The cursor records when it was last reconciled. Both are persisted
//! together by the sync state store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::event::Event;

/// Ordered list of events, ascending by start instant with id as tiebreak
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<Event>);

impl Snapshot {
    /// Creates an empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the canonical snapshot from a provider fetch result
    pub fn from_remote(mut events: Vec<Event>) -> Self {
        events.sort_by(Event::canonical_cmp);
        Self(events)
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the events are in canonical order
    pub fn is_canonical(&self) -> bool {
        self.0
            .windows(2)
            .all(|pair| pair[0].canonical_cmp(&pair[1]).is_le())
    }
}

/// Instant of the last successful reconciliation
///
/// Never moves backwards: [`SyncCursor::advance`] keeps the later of the
/// two instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(DateTime<Utc>);

impl SyncCursor {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the cursor advanced to `now`, or unchanged if `now` is earlier
    #[must_use]
    pub fn advance(self, now: DateTime<Utc>) -> Self {
        Self(self.0.max(now))
    }
}

/// Closed time range passed to the provider's fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Rolling window `[now - past_days, now + future_days]`
    pub fn rolling(now: DateTime<Utc>, past_days: u32, future_days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(past_days)),
            end: now + Duration::days(i64::from(future_days)),
        }
    }

    /// Window whose lower bound is the cursor when one exists
    ///
    /// Deprecated policy kept for installations configured with it: a stale
    /// cursor widens the window into the past instead of keeping it rolling.
    pub fn since_cursor(
        now: DateTime<Utc>,
        cursor: Option<SyncCursor>,
        past_days: u32,
        future_days: u32,
    ) -> Self {
        let rolling = Self::rolling(now, past_days, future_days);
        Self {
            start: cursor.map(|c| c.at()).unwrap_or(rolling.start),
            end: rolling.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::newtypes::EventId;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn event(id: &str, start: DateTime<Utc>) -> Event {
        Event::new(EventId::new(id.to_string()).unwrap(), id, start, start)
    }

    #[test]
    fn from_remote_sorts_by_start_then_id() {
        let snapshot = Snapshot::from_remote(vec![
            event("c", at(2, 9)),
            event("b", at(1, 9)),
            event("a", at(2, 9)),
        ]);

        let ids: Vec<_> = snapshot.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(snapshot.is_canonical());
    }

    #[test]
    fn snapshot_serializes_as_plain_array() {
        let snapshot = Snapshot::from_remote(vec![event("a", at(1, 9))]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.starts_with('['));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(serde_json::from_str::<Snapshot>("[]").unwrap().is_empty());
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let cursor = SyncCursor::new(at(10, 12));
        assert_eq!(cursor.advance(at(9, 0)), cursor);
        assert_eq!(cursor.advance(at(11, 0)).at(), at(11, 0));
    }

    #[test]
    fn rolling_window_ignores_cursor() {
        let now = at(15, 8);
        let window = SyncWindow::rolling(now, 7, 7);
        assert_eq!(window.start, at(8, 8));
        assert_eq!(window.end, at(22, 8));
    }

    #[test]
    fn cursor_window_uses_cursor_lower_bound() {
        let now = at(15, 8);
        let stale = SyncCursor::new(at(1, 0));
        let window = SyncWindow::since_cursor(now, Some(stale), 7, 7);
        assert_eq!(window.start, at(1, 0));
        assert_eq!(window.end, at(22, 8));

        let fresh = SyncWindow::since_cursor(now, None, 7, 7);
        assert_eq!(fresh, SyncWindow::rolling(now, 7, 7));
    }
}
