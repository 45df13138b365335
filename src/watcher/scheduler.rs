//! Periodic drain-and-rebuild loop.
//!
//! Drains the [`DirWatcher`] on a fixed cadence and triggers a full rebuild
//! whenever something changed. A failing or panicking rebuild is logged and
//! never stops later ticks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactVersion, Rebuild};
use crate::config::WatchConfig;

use super::backend::{NotifyBackend, WatchBackend};
use super::dir_watcher::{CloseHandle, DirWatcher};
use super::error::WatchError;
use super::event::WatcherState;

/// Result of a single scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No watcher is configured; nothing was done.
    Disabled,
    /// The drain reported no change.
    Idle,
    /// A change was seen and the rebuild produced this version.
    Rebuilt(ArtifactVersion),
    /// A change was seen but the rebuild failed.
    RebuildFailed,
}

/// Drives a [`DirWatcher`] and the rebuild it triggers.
///
/// Enabled exactly when it holds a successfully constructed watcher.
pub struct RebuildScheduler<B: WatchBackend = NotifyBackend> {
    watcher: Option<Arc<Mutex<DirWatcher<B>>>>,
    close: Option<CloseHandle>,
    rebuilder: Arc<dyn Rebuild>,
    tick_interval: Duration,
    drain_timeout: Duration,
}

impl RebuildScheduler<NotifyBackend> {
    /// Build a scheduler from configuration.
    ///
    /// A missing root yields a disabled scheduler. A root that cannot be
    /// watched is a setup error.
    pub fn from_config(
        config: &WatchConfig,
        rebuilder: Arc<dyn Rebuild>,
    ) -> Result<Self, WatchError> {
        config.validate()?;

        let tick_interval = config.tick_interval();
        let drain_timeout = config.drain_timeout();

        let Some(root) = &config.root else {
            crate::log_event!("scheduler", "disabled", "no watch root configured");
            return Ok(Self::disabled(rebuilder, tick_interval, drain_timeout));
        };

        let watcher = DirWatcher::new(root, config.recursive)?;
        crate::log_event!(
            "scheduler",
            "monitoring",
            "{}",
            watcher.root().path.display()
        );

        Ok(Self::with_watcher(
            watcher,
            rebuilder,
            tick_interval,
            drain_timeout,
        ))
    }
}

impl<B: WatchBackend + 'static> RebuildScheduler<B> {
    /// Create an enabled scheduler around an existing watcher.
    pub fn with_watcher(
        watcher: DirWatcher<B>,
        rebuilder: Arc<dyn Rebuild>,
        tick_interval: Duration,
        drain_timeout: Duration,
    ) -> Self {
        let close = watcher.close_handle();
        Self {
            watcher: Some(Arc::new(Mutex::new(watcher))),
            close: Some(close),
            rebuilder,
            tick_interval,
            drain_timeout,
        }
    }

    /// Create a scheduler whose ticks do nothing.
    pub fn disabled(
        rebuilder: Arc<dyn Rebuild>,
        tick_interval: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            watcher: None,
            close: None,
            rebuilder,
            tick_interval,
            drain_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Lifecycle state of the underlying watcher.
    ///
    /// Never waits on the watcher lock: while a drain holds it the watcher is
    /// by definition still watching. A requested close reports `Closed`.
    pub fn watcher_state(&self) -> WatcherState {
        let Some(watcher) = &self.watcher else {
            return WatcherState::Unopened;
        };

        if self.close.as_ref().is_some_and(CloseHandle::is_closed) {
            return WatcherState::Closed;
        }

        match watcher.try_lock() {
            Some(guard) => guard.state(),
            None => WatcherState::Watching,
        }
    }

    /// Run one drain and, on change, one rebuild.
    pub async fn tick(&self) -> TickOutcome {
        let Some(watcher) = &self.watcher else {
            return TickOutcome::Disabled;
        };

        let watcher = Arc::clone(watcher);
        let timeout = self.drain_timeout;
        let drained =
            tokio::task::spawn_blocking(move || watcher.lock().process_events(timeout)).await;

        let changed = match drained {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!("[scheduler] drain task failed: {e}");
                return TickOutcome::Idle;
            }
        };

        if !changed {
            tracing::trace!("[scheduler] no changes");
            return TickOutcome::Idle;
        }

        let rebuilder = Arc::clone(&self.rebuilder);
        // Own task so a panic inside the builder surfaces as a JoinError
        match tokio::spawn(async move { rebuilder.rebuild().await }).await {
            Ok(Ok(version)) => {
                crate::log_event!("scheduler", "rebuilt", "{version}");
                TickOutcome::Rebuilt(version)
            }
            Ok(Err(e)) => {
                tracing::error!("[scheduler] rebuild failed: {e}");
                TickOutcome::RebuildFailed
            }
            Err(e) => {
                tracing::error!("[scheduler] rebuild panicked: {e}");
                TickOutcome::RebuildFailed
            }
        }
    }

    /// Start ticking on the current tokio runtime.
    pub fn spawn(self) -> SchedulerHandle<B> {
        let token = CancellationToken::new();
        let close = self.close.clone();
        let watcher = self.watcher.clone();

        let loop_token = token.clone();
        let task = tokio::spawn(async move { self.run(loop_token).await });

        SchedulerHandle {
            token,
            close,
            watcher,
            task,
        }
    }

    async fn run(self, token: CancellationToken) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        crate::debug_event!(
            "scheduler",
            "started",
            "every {:?}, drain wait {:?}",
            self.tick_interval,
            self.drain_timeout
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

/// Running scheduler. Dropping it leaves the loop running; call
/// [`SchedulerHandle::shutdown`] to stop.
pub struct SchedulerHandle<B: WatchBackend = NotifyBackend> {
    token: CancellationToken,
    close: Option<CloseHandle>,
    watcher: Option<Arc<Mutex<DirWatcher<B>>>>,
    task: JoinHandle<()>,
}

impl<B: WatchBackend> SchedulerHandle<B> {
    /// Stop ticking and close the watcher.
    ///
    /// An in-flight drain is interrupted; an in-flight rebuild is allowed to
    /// finish.
    pub async fn shutdown(self) -> Result<(), WatchError> {
        if let Some(close) = &self.close {
            close.close();
        }
        self.token.cancel();

        if let Err(e) = self.task.await {
            tracing::error!("[scheduler] loop ended abnormally: {e}");
        }

        if let Some(watcher) = self.watcher {
            watcher.lock().close()?;
        }

        crate::log_event!("scheduler", "stopped");
        Ok(())
    }
}
