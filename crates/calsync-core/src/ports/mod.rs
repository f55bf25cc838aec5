//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the sync core depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICalendarProvider`] - Calendar store access (permissions, calendars, events)
//! - [`IKeyValueStore`] - Opaque string persistence for sync state
//! - [`INotificationService`] - User-visible failure signals

pub mod calendar_provider;
pub mod key_value_store;
pub mod notification;

pub use calendar_provider::{CalendarInfo, ICalendarProvider, PermissionStatus};
pub use key_value_store::IKeyValueStore;
pub use notification::{INotificationService, Notification, NotificationPriority};
