//! Event mutations
//!
//! Creates, updates and deletes single events through the calendar
//! provider. Permission is checked on every call. A successful mutation is
//! followed by one reconciliation pass so the snapshot reflects the change.
//! If a sync is already running, that pass is queued behind it. The outcome
//! of the pass does not affect the mutation result.

use std::sync::Arc;

use calsync_core::{
    domain::{EventDraft, EventId, SkipReason, TriggerSource},
    ports::ICalendarProvider,
};
use tracing::{debug, info, warn};

use crate::orchestrator::{SyncOrchestrator, TriggerOutcome};
use crate::SyncError;

/// Create/update/delete front end for the calendar provider
pub struct EventMutationService {
    provider: Arc<dyn ICalendarProvider>,
    orchestrator: Arc<SyncOrchestrator>,
    reminder_minutes: u32,
}

impl EventMutationService {
    /// `reminder_minutes` is the alarm lead time attached on create and update
    pub fn new(
        provider: Arc<dyn ICalendarProvider>,
        orchestrator: Arc<SyncOrchestrator>,
        reminder_minutes: u32,
    ) -> Self {
        Self {
            provider,
            orchestrator,
            reminder_minutes,
        }
    }

    /// Creates an event and returns its provider id
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, draft: &EventDraft) -> Result<EventId, SyncError> {
        self.ensure_permission().await?;

        let id = self
            .provider
            .create_event(draft, Some(self.reminder_minutes))
            .await
            .map_err(|e| SyncError::MutationFailed(format!("create: {e:#}")))?;

        info!(id = %id, "Event created");
        self.resync().await;
        Ok(id)
    }

    /// Replaces the attributes of event `id`
    #[tracing::instrument(skip(self, draft), fields(id = %id))]
    pub async fn update(&self, id: &EventId, draft: &EventDraft) -> Result<(), SyncError> {
        self.ensure_permission().await?;

        let updated = self
            .provider
            .update_event(id, draft, Some(self.reminder_minutes))
            .await
            .map_err(|e| SyncError::MutationFailed(format!("update: {e:#}")))?;
        if !updated {
            return Err(SyncError::MutationFailed(format!(
                "provider refused to update event {id}"
            )));
        }

        info!("Event updated");
        self.resync().await;
        Ok(())
    }

    /// Removes event `id`
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: &EventId) -> Result<(), SyncError> {
        self.ensure_permission().await?;

        let deleted = self
            .provider
            .delete_event(id)
            .await
            .map_err(|e| SyncError::MutationFailed(format!("delete: {e:#}")))?;
        if !deleted {
            return Err(SyncError::MutationFailed(format!(
                "provider refused to delete event {id}"
            )));
        }

        info!("Event deleted");
        self.resync().await;
        Ok(())
    }

    async fn ensure_permission(&self) -> Result<(), SyncError> {
        let permission = self
            .provider
            .check_permission()
            .await
            .map_err(SyncError::Provider)?;
        if permission.is_granted() {
            Ok(())
        } else {
            warn!(permission = %permission, "Mutation rejected, calendar permission missing");
            Err(SyncError::PermissionDenied)
        }
    }

    async fn resync(&self) {
        match self.orchestrator.trigger(TriggerSource::Mutation).await {
            TriggerOutcome::Completed(_) => {}
            TriggerOutcome::Skipped(SkipReason::Queued) => {
                debug!("Post-mutation sync queued behind running sync");
            }
            other => warn!(outcome = ?other, "Post-mutation sync did not complete"),
        }
    }
}
