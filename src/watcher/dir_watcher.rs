//! Directory watcher core: registration set plus the bounded drain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};

use super::backend::{NotifyBackend, WatchBackend, is_real_dir};
use super::error::WatchError;
use super::event::{EventKind, WatchRoot, WatcherState};
use super::registrar::{register, register_all};
use super::registry::RegistrationTable;

/// Watches a directory (optionally its whole tree) and coalesces every
/// notification into a single "something changed" answer per drain.
///
/// The registration table is owned here and never handed out; callers can
/// only take read-only snapshots.
pub struct DirWatcher<B: WatchBackend = NotifyBackend> {
    root: WatchRoot,
    backend: B,
    table: RegistrationTable,
    state: WatcherState,
    close_requested: Arc<AtomicBool>,
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
}

impl DirWatcher<NotifyBackend> {
    /// Watch `root` with the platform's native notification backend.
    pub fn new(root: impl AsRef<Path>, recursive: bool) -> Result<Self, WatchError> {
        Self::with_backend(NotifyBackend::new()?, root, recursive)
    }
}

impl<B: WatchBackend> DirWatcher<B> {
    /// Watch `root` through the given backend.
    ///
    /// The root is canonicalized first. When `recursive`, every directory
    /// under it is registered before this returns; that scan is proportional
    /// to the number of directories in the tree.
    pub fn with_backend(
        mut backend: B,
        root: impl AsRef<Path>,
        recursive: bool,
    ) -> Result<Self, WatchError> {
        let requested = root.as_ref();
        let path = requested.canonicalize().map_err(|source| WatchError::Io {
            path: requested.to_path_buf(),
            source,
        })?;

        if !path.is_dir() {
            return Err(WatchError::NotADirectory { path });
        }

        let table = RegistrationTable::new();

        if recursive {
            crate::log_event!("watcher", "scanning", "{}", path.display());
            let count = register_all(&mut backend, &table, &path)?;
            crate::log_event!("watcher", "scan done", "{count} directories");
        } else {
            register(&mut backend, &table, &path)?;
        }

        let (interrupt_tx, interrupt_rx) = bounded(1);

        Ok(Self {
            root: WatchRoot { path, recursive },
            backend,
            table,
            state: WatcherState::Watching,
            close_requested: Arc::new(AtomicBool::new(false)),
            interrupt_tx,
            interrupt_rx,
        })
    }

    /// Drain pending notifications, waiting at most `timeout` for the first.
    ///
    /// Returns `true` iff at least one create, delete or modify event was
    /// seen. Nothing that goes wrong in here propagates: unknown keys,
    /// overflows and failed sub-registrations are logged and skipped.
    pub fn process_events(&mut self, timeout: Duration) -> bool {
        if self.state != WatcherState::Watching || self.close_requested.load(Ordering::Acquire) {
            return false;
        }

        let Some(batch) = self.backend.poll(timeout, &self.interrupt_rx) else {
            return false;
        };

        let Some(dir) = self.table.get(batch.key) else {
            tracing::error!("[watcher] subscription {} not recognized", batch.key);
            return false;
        };

        let mut changed = false;

        for event in batch.events {
            if event.kind == EventKind::Overflow {
                tracing::error!(
                    "[watcher] overflow in {}, some events were dropped",
                    dir.display()
                );
                continue;
            }

            let Some(name) = event.name else {
                continue;
            };

            let child = dir.join(name);
            crate::log_event!("watcher", event.kind.label(), "{}", child.display());
            changed = true;

            // Register new subtrees before returning so nothing written
            // inside them goes unseen
            if self.root.recursive && event.kind == EventKind::Created && is_real_dir(&child) {
                if let Err(e) = register_all(&mut self.backend, &self.table, &child) {
                    tracing::error!("[watcher] failed to register {}: {e}", child.display());
                }
            }
        }

        if !self.backend.reset(batch.key) {
            self.table.remove(batch.key);
            crate::debug_event!("watcher", "unregistered", "{}", dir.display());
        }

        changed
    }

    /// Release every subscription. The watcher is unusable afterwards.
    pub fn close(&mut self) -> Result<(), WatchError> {
        if self.state == WatcherState::Closed {
            return Ok(());
        }

        self.close_requested.store(true, Ordering::Release);
        self.state = WatcherState::Closed;
        self.table.clear();
        self.backend.close()?;

        crate::log_event!("watcher", "closed", "{}", self.root.path.display());
        Ok(())
    }

    /// Handle that can stop this watcher from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            requested: self.close_requested.clone(),
            interrupt: self.interrupt_tx.clone(),
        }
    }

    pub fn root(&self) -> &WatchRoot {
        &self.root
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Snapshot of every registered directory, sorted.
    pub fn registered_dirs(&self) -> Vec<PathBuf> {
        self.table.dirs()
    }

    pub fn is_registered(&self, dir: &Path) -> bool {
        self.table.contains_dir(dir)
    }

    pub fn registration_count(&self) -> usize {
        self.table.len()
    }
}

/// Requests a [`DirWatcher`] to stop.
///
/// Wakes any drain that is currently blocked and makes every later drain
/// return `false` at once. The owner still calls [`DirWatcher::close`] to
/// release the subscriptions.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    requested: Arc<AtomicBool>,
    interrupt: Sender<()>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.requested.store(true, Ordering::Release);
        let _ = self.interrupt.try_send(());
    }

    pub fn is_closed(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
