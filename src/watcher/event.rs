//! Value types shared by the watcher core and its backends.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Opaque handle for one active directory subscription.
///
/// Keys are unique per backend for as long as the subscription lives and are
/// never reused after the subscription is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(u64);

impl WatchKey {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of filesystem occurrence reported for a watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Deleted,
    Modified,
    /// The backend dropped events because its buffer ran out.
    Overflow,
}

impl EventKind {
    /// Short label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::Modified => "modified",
            EventKind::Overflow => "overflow",
        }
    }
}

/// One observed occurrence inside a watched directory.
///
/// The directory itself is implied by the batch's key. `name` is the entry
/// name relative to that directory and is absent for overflow events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub kind: EventKind,
    pub name: Option<OsString>,
}

impl PendingEvent {
    pub fn new(kind: EventKind, name: impl Into<OsString>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
        }
    }

    pub fn overflow() -> Self {
        Self {
            kind: EventKind::Overflow,
            name: None,
        }
    }
}

/// Events that arrived for a single subscription, in arrival order.
///
/// A batch may be empty when the backend only signals the key, e.g. when the
/// watched directory itself went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub key: WatchKey,
    pub events: Vec<PendingEvent>,
}

impl EventBatch {
    pub fn new(key: WatchKey) -> Self {
        Self {
            key,
            events: Vec::new(),
        }
    }
}

/// The directory a watcher was asked to observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    pub path: PathBuf,
    pub recursive: bool,
}

/// Lifecycle of a [`DirWatcher`](super::DirWatcher).
///
/// `Unopened` only exists before construction succeeds; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Unopened,
    Watching,
    Closed,
}
