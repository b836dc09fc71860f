//! File watching.
//!
//! Turns raw notify events into [`FsChange`]s on an async channel. Timing
//! (debouncing, coalescing) is the coordinator's job, not the watcher's.

use std::path::PathBuf;
use std::sync::mpsc;

use kiln_build::ChangeKind;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// A single changed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FsChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// File watcher for detecting changes.
///
/// Events stop when the watcher is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// Returns the watcher and a channel to receive changes.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<FsChange>), notify::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = sync_tx.send(res);
        })?;

        for path in paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
            } else {
                tracing::warn!("Not watching missing path: {}", path.display());
            }
        }

        // notify calls back on its own thread; bridge into tokio here.
        std::thread::spawn(move || {
            while let Ok(result) = sync_rx.recv() {
                match result {
                    Ok(event) => {
                        for change in classify_event(&event) {
                            if async_tx.blocking_send(change).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!("Watch error: {}", e),
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Convert a notify event into zero or more changes.
///
/// Metadata-only modifications are dropped; renames become a removal of the
/// old path and a creation of the new one.
pub fn classify_event(event: &notify::Event) -> Vec<FsChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first() {
                changes.push(FsChange::new(from, ChangeKind::Removed));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push(FsChange::new(to, ChangeKind::Created));
            }
            return changes;
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| FsChange::new(path, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn classifies_basic_kinds() {
        assert_eq!(
            classify_event(&event(EventKind::Create(CreateKind::File), &["/a"])),
            vec![FsChange::new("/a", ChangeKind::Created)]
        );
        assert_eq!(
            classify_event(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Any)),
                &["/a"]
            )),
            vec![FsChange::new("/a", ChangeKind::Modified)]
        );
        assert_eq!(
            classify_event(&event(EventKind::Remove(RemoveKind::File), &["/a"])),
            vec![FsChange::new("/a", ChangeKind::Removed)]
        );
    }

    #[test]
    fn ignores_metadata_and_access() {
        assert!(classify_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/a"]
        ))
        .is_empty());
        assert!(classify_event(&event(EventKind::Access(AccessKind::Any), &["/a"])).is_empty());
    }

    #[test]
    fn splits_renames() {
        assert_eq!(
            classify_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/old", "/new"]
            )),
            vec![
                FsChange::new("/old", ChangeKind::Removed),
                FsChange::new("/new", ChangeKind::Created),
            ]
        );
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("test.tpl");

        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "<p>created</p>").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(change.is_ok(), "timeout waiting for file watch event");
        assert!(change.unwrap().is_some(), "channel should not be closed");
    }
}
