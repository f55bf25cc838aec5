//! Classification of differences between two event sets

use std::fmt;

use serde::{Deserialize, Serialize};

use super::event::Event;

/// Kind of change detected for a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "+"),
            ChangeKind::Updated => write!(f, "~"),
            ChangeKind::Deleted => write!(f, "-"),
        }
    }
}

/// Added / updated / deleted partition produced by the diff
///
/// `added` and `updated` hold the remote copies, `deleted` holds the local
/// copies of events that disappeared remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChanges {
    pub added: Vec<Event>,
    pub updated: Vec<Event>,
    pub deleted: Vec<Event>,
}

impl EventChanges {
    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of classified events
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    /// Iterates over every change with its kind
    pub fn iter(&self) -> impl Iterator<Item = (ChangeKind, &Event)> {
        self.added
            .iter()
            .map(|e| (ChangeKind::Added, e))
            .chain(self.updated.iter().map(|e| (ChangeKind::Updated, e)))
            .chain(self.deleted.iter().map(|e| (ChangeKind::Deleted, e)))
    }
}
