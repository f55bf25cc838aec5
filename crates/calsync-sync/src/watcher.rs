//! Calendar store change detection
//!
//! Wraps the `notify` crate to observe the file-backed calendar store and
//! turn content changes into [`SyncTrigger::ContentChange`] requests.
//!
//! The store is replaced atomically (temp file + rename), which changes the
//! file's inode on every write. The watcher therefore observes the parent
//! directory and filters events by file name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use crate::scheduler::SchedulerHandle;

/// Watches the calendar store file; dropping it stops observation
pub struct CalendarChangeWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl CalendarChangeWatcher {
    /// Starts observing `path` and signals changes through `handle`
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be watched.
    pub fn start(path: &Path, handle: SchedulerHandle) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("Calendar path has no file name: {}", path.display()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if is_store_change(&event, &file_name) {
                        debug!(kind = ?event.kind, "Calendar store changed");
                        handle.calendar_changed();
                    }
                }
                Err(err) => {
                    error!(error = %err, "Calendar watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create calendar watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        info!(path = %path.display(), "Watching calendar store for changes");

        Ok(Self {
            _watcher: watcher,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns true for create/modify/remove events touching the store file
fn is_store_change(event: &notify::Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn store_writes_are_changes() {
        let name = OsString::from("calendar.json");
        assert!(is_store_change(
            &event(EventKind::Create(CreateKind::File), "/data/calendar.json"),
            &name
        ));
        assert!(is_store_change(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "/data/calendar.json"
            ),
            &name
        ));
        assert!(is_store_change(
            &event(EventKind::Remove(RemoveKind::File), "/data/calendar.json"),
            &name
        ));
    }

    #[test]
    fn other_files_and_access_are_ignored() {
        let name = OsString::from("calendar.json");
        assert!(!is_store_change(
            &event(EventKind::Create(CreateKind::File), "/data/.tmp123"),
            &name
        ));
        assert!(!is_store_change(
            &event(EventKind::Access(AccessKind::Read), "/data/calendar.json"),
            &name
        ));
    }

    #[test]
    fn rename_onto_store_is_a_change() {
        let name = OsString::from("calendar.json");
        let event = notify::Event {
            kind: EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::Both)),
            paths: vec![
                PathBuf::from("/data/.calendar.json.tmp"),
                PathBuf::from("/data/calendar.json"),
            ],
            attrs: Default::default(),
        };
        assert!(is_store_change(&event, &name));
    }
}
