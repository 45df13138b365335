//! Self-healing recursive directory watcher that rebuilds a versioned rule
//! artifact whenever anything under the watched tree changes.

pub mod artifact;
pub mod config;
pub mod logging;
pub mod paths;
pub mod watcher;

pub use artifact::{ArtifactVersion, Rebuild, RebuildError, RuleArtifact, RuleSetBuilder};
pub use config::{LoggingConfig, RulesConfig, Settings, WatchConfig};
pub use paths::relative_path;
pub use watcher::{
    CloseHandle, DirWatcher, RebuildScheduler, SchedulerHandle, TickOutcome, WatchError,
};
