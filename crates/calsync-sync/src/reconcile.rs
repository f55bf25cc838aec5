//! Reconciliation engine
//!
//! Compares a freshly fetched event set against the cached snapshot,
//! classifies each event as added, updated or deleted, and commits the
//! canonical snapshot together with an advanced cursor.
//!
//! The provider is the source of truth: the committed snapshot is always
//! the fetched set in canonical order. The classification exists for
//! observability.

use std::collections::{HashMap, HashSet};

use calsync_core::domain::{Event, EventChanges, EventId, Snapshot, SyncCursor};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::state_store::SyncStateStore;
use crate::SyncError;

/// Partitions `remote` against `local` by event id
///
/// An id only in `remote` is added, an id in both whose attributes differ is
/// updated, an id only in `local` is deleted. Output lists keep the order of
/// their input slice.
pub fn diff(remote: &[Event], local: &[Event]) -> EventChanges {
    let local_by_id: HashMap<&EventId, &Event> = local.iter().map(|e| (&e.id, e)).collect();
    let remote_ids: HashSet<&EventId> = remote.iter().map(|e| &e.id).collect();

    let mut changes = EventChanges::default();

    for event in remote {
        match local_by_id.get(&event.id) {
            None => changes.added.push(event.clone()),
            Some(existing) if *existing != event => changes.updated.push(event.clone()),
            Some(_) => {}
        }
    }

    changes.deleted = local
        .iter()
        .filter(|e| !remote_ids.contains(&e.id))
        .cloned()
        .collect();

    changes
}

/// Result of a committed reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The snapshot that was persisted
    pub snapshot: Snapshot,
    /// Classification against the previous snapshot
    pub changes: EventChanges,
    /// The cursor that was persisted
    pub cursor: SyncCursor,
}

/// Reconciles fetched events into the persisted sync state
#[derive(Clone)]
pub struct Reconciler {
    state: SyncStateStore,
}

impl Reconciler {
    pub fn new(state: SyncStateStore) -> Self {
        Self { state }
    }

    /// Underlying state store
    pub fn state(&self) -> &SyncStateStore {
        &self.state
    }

    /// Diffs `remote` against the stored snapshot and commits it
    ///
    /// On a persistence failure nothing is returned and the previous
    /// snapshot and cursor stay authoritative.
    #[tracing::instrument(skip_all, fields(remote = remote.len()))]
    pub async fn reconcile(
        &self,
        remote: Vec<Event>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let local = self.state.load_snapshot().await;
        let changes = diff(&remote, local.events());

        for (kind, event) in changes.iter() {
            debug!(change = %kind, id = %event.id, title = %event.title, "Event changed");
        }

        let snapshot = Snapshot::from_remote(remote);
        let cursor = match self.state.load_cursor().await {
            Some(previous) => previous.advance(now),
            None => SyncCursor::new(now),
        };

        self.state.commit(&snapshot, cursor).await?;

        info!(
            added = changes.added.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            total = snapshot.len(),
            "Reconciled snapshot"
        );

        Ok(ReconcileOutcome {
            snapshot,
            changes,
            cursor,
        })
    }
}
