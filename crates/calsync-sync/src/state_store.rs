//! Sync state persistence
//!
//! Keeps the reconciled snapshot and the last sync instant as JSON records
//! under stable keys of an [`IKeyValueStore`]. Reads are forgiving: a
//! missing, unreadable or malformed record is logged and treated as absent.
//! Writes are strict and go through a single `set_many` call so that the
//! snapshot and the cursor are persisted together.

use std::sync::Arc;

use calsync_core::{
    domain::{DomainError, Snapshot, SyncCursor},
    ports::IKeyValueStore,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::SyncError;

/// Key of the last successful sync instant
pub const LAST_SYNC_KEY: &str = "lastSyncTime";

/// Key of the cached event snapshot
pub const SNAPSHOT_KEY: &str = "localEvents";

/// Snapshot and cursor records backed by a key-value store
#[derive(Clone)]
pub struct SyncStateStore {
    store: Arc<dyn IKeyValueStore>,
}

impl SyncStateStore {
    pub fn new(store: Arc<dyn IKeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the persisted snapshot, or an empty one if none can be read
    pub async fn load_snapshot(&self) -> Snapshot {
        match self.read_json::<Snapshot>(SNAPSHOT_KEY).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::empty(),
            Err(e) => {
                warn!(key = SNAPSHOT_KEY, error = %e, "Failed to read snapshot, using empty");
                Snapshot::empty()
            }
        }
    }

    /// Loads the persisted cursor, if one can be read
    pub async fn load_cursor(&self) -> Option<SyncCursor> {
        match self.read_json::<SyncCursor>(LAST_SYNC_KEY).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(key = LAST_SYNC_KEY, error = %e, "Failed to read sync cursor");
                None
            }
        }
    }

    /// Persists the snapshot and the cursor as one unit
    ///
    /// The snapshot is written first. With a store that writes entries
    /// sequentially, a failure leaves the previous cursor in place.
    pub async fn commit(&self, snapshot: &Snapshot, cursor: SyncCursor) -> Result<(), SyncError> {
        let snapshot_json = serde_json::to_string(snapshot)
            .map_err(|e| SyncError::Persistence(format!("serializing snapshot: {e}")))?;
        let cursor_json = serde_json::to_string(&cursor)
            .map_err(|e| SyncError::Persistence(format!("serializing cursor: {e}")))?;

        self.store
            .set_many(&[(SNAPSHOT_KEY, snapshot_json), (LAST_SYNC_KEY, cursor_json)])
            .await
            .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

        debug!(events = snapshot.len(), cursor = %cursor.at(), "Committed sync state");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let raw = self
            .store
            .get(key)
            .await
            .map_err(|e| SyncError::Persistence(format!("{e:#}")))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        serde_json::from_str(&raw).map(Some).map_err(|e| {
            SyncError::Domain(DomainError::MalformedRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
    }
}
