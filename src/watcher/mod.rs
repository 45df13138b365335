//! Recursive directory watcher driving artifact rebuilds.
//!
//! This module keeps a live registration over a directory tree, coalesces
//! filesystem notifications into a single "something changed" signal, and
//! triggers a rebuild on a fixed cadence.
//!
//! # Architecture
//!
//! ```text
//! RebuildScheduler (tokio interval)
//!   - drains DirWatcher with a bounded wait
//!   - calls Rebuild on change, logs failures
//!         |
//! DirWatcher
//!   - RegistrationTable (key -> directory)
//!   - registers new subdirectories while draining
//!         |
//! WatchBackend
//!   - NotifyBackend: one non-recursive notify watch per directory
//! ```

mod backend;
mod dir_watcher;
mod error;
mod event;
mod registrar;
mod registry;
mod scheduler;

pub use backend::{NotifyBackend, WatchBackend};
pub use dir_watcher::{CloseHandle, DirWatcher};
pub use error::WatchError;
pub use event::{EventBatch, EventKind, PendingEvent, WatchKey, WatchRoot, WatcherState};
pub use registry::RegistrationTable;
pub use scheduler::{RebuildScheduler, SchedulerHandle, TickOutcome};
