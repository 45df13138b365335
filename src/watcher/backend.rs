//! Notification backends behind the watcher core.
//!
//! A backend owns the OS-level subscriptions. The watcher core only sees
//! opaque [`WatchKey`]s and per-key [`EventBatch`]es, so the core stays the
//! same whether the platform offers inotify, kqueue, FSEvents or
//! ReadDirectoryChangesW.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, select, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as RawKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatchError;
use super::event::{EventBatch, EventKind, PendingEvent, WatchKey};

/// Low-level directory change subscription service.
pub trait WatchBackend: Send {
    /// Subscribe one directory (non-recursively) for create, delete and
    /// modify notifications.
    ///
    /// Subscribing a directory that is already subscribed re-arms it and
    /// returns the existing key.
    fn register(&mut self, dir: &Path) -> Result<WatchKey, WatchError>;

    /// Wait up to `timeout` for the next batch of notifications.
    ///
    /// Returns `None` on timeout, or as soon as `interrupt` becomes ready.
    fn poll(&mut self, timeout: Duration, interrupt: &Receiver<()>) -> Option<EventBatch>;

    /// Re-arm a key after its batch was processed.
    ///
    /// Returns `false` when the directory is gone; the subscription is then
    /// cancelled and the key must not be used again.
    fn reset(&mut self, key: WatchKey) -> bool;

    /// Release every subscription.
    fn close(&mut self) -> Result<(), WatchError>;
}

/// Backend built on `notify::RecommendedWatcher`.
///
/// Each directory gets its own non-recursive watch. Raw events are grouped
/// per parent directory into batches, preserving arrival order.
pub struct NotifyBackend {
    /// The underlying file watcher. `None` once closed.
    watcher: Option<RecommendedWatcher>,
    /// Channel for receiving raw events from notify.
    event_rx: Receiver<notify::Result<Event>>,
    keys_by_dir: HashMap<PathBuf, WatchKey>,
    dirs_by_key: HashMap<WatchKey, PathBuf>,
    next_key: u64,
    /// Batches collected but not yet handed out.
    ready: VecDeque<EventBatch>,
}

impl NotifyBackend {
    /// Create the platform watcher.
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        Ok(Self {
            watcher: Some(watcher),
            event_rx: rx,
            keys_by_dir: HashMap::new(),
            dirs_by_key: HashMap::new(),
            next_key: 0,
            ready: VecDeque::new(),
        })
    }

    /// Sort one raw notify result into the per-key batches.
    fn enqueue(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("[watcher] file watch error: {e}");
                return;
            }
        };

        if event.need_rescan() {
            self.enqueue_overflow(&event);
            return;
        }

        for (kind, path) in classify(&event) {
            self.enqueue_path(kind, &path);
        }
    }

    fn enqueue_overflow(&mut self, event: &Event) {
        // Prefer the directory the backend named, else the oldest live watch
        let key = event
            .paths
            .iter()
            .find_map(|p| {
                self.keys_by_dir
                    .get(p)
                    .or_else(|| p.parent().and_then(|parent| self.keys_by_dir.get(parent)))
            })
            .copied()
            .or_else(|| self.dirs_by_key.keys().min().copied());

        match key {
            Some(key) => self.batch_for(key).events.push(PendingEvent::overflow()),
            None => tracing::error!("[watcher] overflow with no live registration"),
        }
    }

    fn enqueue_path(&mut self, kind: EventKind, path: &Path) {
        let mut matched = false;

        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(&key) = self.keys_by_dir.get(parent) {
                self.batch_for(key)
                    .events
                    .push(PendingEvent::new(kind, name.to_os_string()));
                matched = true;
            }
        }

        // A watched directory that went away signals its own key so the next
        // reset notices and drops it.
        if kind == EventKind::Deleted {
            if let Some(&key) = self.keys_by_dir.get(path) {
                self.batch_for(key);
                matched = true;
            }
        }

        if !matched {
            crate::debug_event!("watcher", "unmatched", "{:?} {}", kind, path.display());
        }
    }

    /// Find the queued batch for `key`, or queue a new empty one.
    fn batch_for(&mut self, key: WatchKey) -> &mut EventBatch {
        let index = match self.ready.iter().position(|batch| batch.key == key) {
            Some(index) => index,
            None => {
                self.ready.push_back(EventBatch::new(key));
                self.ready.len() - 1
            }
        };
        &mut self.ready[index]
    }

    fn unwatch(&mut self, dir: &Path) {
        if let Some(watcher) = self.watcher.as_mut() {
            // The OS usually dropped the watch already when the dir vanished
            if let Err(e) = watcher.unwatch(dir) {
                crate::debug_event!("watcher", "unwatch", "{}: {e}", dir.display());
            }
        }
    }
}

impl WatchBackend for NotifyBackend {
    fn register(&mut self, dir: &Path) -> Result<WatchKey, WatchError> {
        let watcher = self.watcher.as_mut().ok_or_else(|| WatchError::PathWatchFailed {
            path: dir.to_path_buf(),
            reason: "watcher is closed".to_string(),
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(&key) = self.keys_by_dir.get(dir) {
            return Ok(key);
        }

        let key = WatchKey::new(self.next_key);
        self.next_key += 1;
        self.keys_by_dir.insert(dir.to_path_buf(), key);
        self.dirs_by_key.insert(key, dir.to_path_buf());
        Ok(key)
    }

    fn poll(&mut self, timeout: Duration, interrupt: &Receiver<()>) -> Option<EventBatch> {
        if let Some(batch) = self.ready.pop_front() {
            return Some(batch);
        }

        let first = select! {
            recv(self.event_rx) -> msg => msg.ok()?,
            recv(interrupt) -> _ => return None,
            default(timeout) => return None,
        };

        self.enqueue(first);
        while let Ok(res) = self.event_rx.try_recv() {
            self.enqueue(res);
        }

        self.ready.pop_front()
    }

    fn reset(&mut self, key: WatchKey) -> bool {
        let Some(dir) = self.dirs_by_key.get(&key).cloned() else {
            return false;
        };

        if is_real_dir(&dir) {
            return true;
        }

        self.unwatch(&dir);
        self.dirs_by_key.remove(&key);
        self.keys_by_dir.remove(&dir);
        self.ready.retain(|batch| batch.key != key);
        false
    }

    fn close(&mut self) -> Result<(), WatchError> {
        let dirs: Vec<PathBuf> = self.keys_by_dir.drain().map(|(dir, _)| dir).collect();
        for dir in &dirs {
            self.unwatch(dir);
        }

        self.dirs_by_key.clear();
        self.ready.clear();
        // Dropping the notify watcher stops its event thread
        self.watcher = None;
        Ok(())
    }
}

/// Whether `path` is a directory, without following a final symlink.
pub(crate) fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Map a raw notify event onto (kind, path) pairs.
///
/// Access notifications are not changes and yield nothing.
fn classify(event: &Event) -> Vec<(EventKind, PathBuf)> {
    let each = |kind: EventKind| -> Vec<(EventKind, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };

    match event.kind {
        RawKind::Create(_) => each(EventKind::Created),
        RawKind::Remove(_) => each(EventKind::Deleted),
        RawKind::Modify(ModifyKind::Name(RenameMode::From)) => each(EventKind::Deleted),
        RawKind::Modify(ModifyKind::Name(RenameMode::To)) => each(EventKind::Created),
        RawKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push((EventKind::Deleted, from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((EventKind::Created, to.clone()));
            }
            out
        }
        // Backends that cannot tell the direction of a rename
        RawKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    EventKind::Created
                } else {
                    EventKind::Deleted
                };
                (kind, p.clone())
            })
            .collect(),
        RawKind::Modify(_) | RawKind::Any => each(EventKind::Modified),
        RawKind::Access(_) | RawKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use notify::event::{AccessKind, CreateKind, Flag, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify_create_and_remove() {
        let created = Event::new(RawKind::Create(CreateKind::File)).add_path("/r/a.txt".into());
        assert_eq!(
            classify(&created),
            vec![(EventKind::Created, PathBuf::from("/r/a.txt"))]
        );

        let removed = Event::new(RawKind::Remove(RemoveKind::Folder)).add_path("/r/sub".into());
        assert_eq!(
            classify(&removed),
            vec![(EventKind::Deleted, PathBuf::from("/r/sub"))]
        );
    }

    #[test]
    fn test_classify_rename_both() {
        let renamed = Event::new(RawKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/r/old.drl".into())
            .add_path("/r/new.drl".into());

        assert_eq!(
            classify(&renamed),
            vec![
                (EventKind::Deleted, PathBuf::from("/r/old.drl")),
                (EventKind::Created, PathBuf::from("/r/new.drl")),
            ]
        );
    }

    #[test]
    fn test_classify_ignores_access() {
        let access = Event::new(RawKind::Access(AccessKind::Any)).add_path("/r/a.txt".into());
        assert!(classify(&access).is_empty());
    }

    #[test]
    fn test_rescan_flag_means_overflow() {
        let event = Event::new(RawKind::Other).set_flag(Flag::Rescan);
        assert!(event.need_rescan());
        // Rescan events carry no classified paths of their own
        assert!(classify(&event).is_empty());
    }

    #[test]
    fn test_reset_discards_batches_queued_for_a_dead_key() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut backend = NotifyBackend::new().unwrap();
        let key = backend.register(&sub).unwrap();
        fs::remove_dir(&sub).unwrap();

        // Two batches for the same key still waiting to be handed out
        backend.ready.push_back(EventBatch {
            key,
            events: vec![PendingEvent::new(EventKind::Created, "a.drl")],
        });
        backend.ready.push_back(EventBatch {
            key,
            events: vec![PendingEvent::new(EventKind::Modified, "b.drl")],
        });

        let (_interrupt_tx, interrupt) = bounded::<()>(1);
        let first = backend.poll(Duration::from_millis(10), &interrupt).unwrap();
        assert_eq!(first.key, key);

        assert!(!backend.reset(key));
        assert!(!backend.reset(key));

        while let Some(batch) = backend.poll(Duration::from_millis(200), &interrupt) {
            assert_ne!(batch.key, key);
        }
    }
}
