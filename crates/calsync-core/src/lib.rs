//! calsync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Event`, `Snapshot`, `SyncCursor`, `SyncSession`, `EventChanges`
//! - **Port definitions** - Traits for adapters: `ICalendarProvider`, `IKeyValueStore`,
//!   `INotificationService`
//! - **Configuration** - YAML-backed settings for sync timing, retry policy and storage
//!
//! # Architecture
//!
//! The domain module contains pure data and invariants with no I/O.
//! Ports define the trait interfaces that adapter crates implement
//! (`calsync-local` for the calendar store, `calsync-cache` for persistence).
//! The synchronization logic itself lives in `calsync-sync`.

pub mod config;
pub mod domain;
pub mod ports;
