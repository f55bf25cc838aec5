//! Domain entities and invariants
//!
//! This module contains the core domain types for calsync:
//! - Newtypes for provider-assigned identifiers
//! - Calendar events and drafts
//! - The local snapshot, sync cursor and fetch window
//! - Diff classification (added/updated/deleted)
//! - The sync session state machine
//! - Domain-specific error types

pub mod changes;
pub mod errors;
pub mod event;
pub mod newtypes;
pub mod session;
pub mod snapshot;

// Re-export commonly used types
pub use changes::{ChangeKind, EventChanges};
pub use errors::DomainError;
pub use event::{Event, EventDraft};
pub use newtypes::{CalendarId, EventId};
pub use session::{SkipReason, SyncSession, SyncStatus, TriggerSource};
pub use snapshot::{Snapshot, SyncCursor, SyncWindow};
