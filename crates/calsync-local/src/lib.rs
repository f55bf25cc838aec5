//! Calsync Local - File-backed calendar provider
//!
//! Implements the `ICalendarProvider` port from `calsync-core` on top of a
//! single JSON document on disk. It stands in for the platform calendar
//! database on machines that do not have one.
//!
//! ## Modules
//!
//! - [`document`] - On-disk JSON layout (permission, calendars, events)
//! - [`provider`] - [`LocalCalendarProvider`], the port implementation

pub mod document;
pub mod provider;

use std::path::PathBuf;

use calsync_core::domain::DomainError;
use thiserror::Error;

pub use document::{Alarm, CalendarDocument, StoredEvent};
pub use provider::LocalCalendarProvider;

/// Errors raised by the file-backed calendar store
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Reading or writing the store file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not a valid calendar document
    #[error("Malformed calendar store {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The store file does not exist
    #[error("Calendar store not found: {0}")]
    NotFound(PathBuf),

    /// Calendar access has not been granted
    #[error("Calendar access not granted")]
    AccessDenied,

    /// No calendar accepts the requested change
    #[error("Calendar not writable: {0}")]
    NotWritable(String),

    /// A domain-level error propagated from calsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}
