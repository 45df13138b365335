//! Versioned rule artifacts and the rebuild boundary.
//!
//! The watcher never looks inside an artifact. It only asks a [`Rebuild`]
//! implementation for a fresh one and logs whether that worked.

mod builder;
mod error;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

pub use builder::RuleSetBuilder;
pub use error::RebuildError;

/// Build version: milliseconds since the Unix epoch, strictly increasing per
/// builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactVersion(u64);

impl ArtifactVersion {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Immutable snapshot of every rule file, keyed by `/`-separated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleArtifact {
    version: ArtifactVersion,
    files: BTreeMap<String, String>,
}

impl RuleArtifact {
    pub fn new(version: ArtifactVersion, files: BTreeMap<String, String>) -> Self {
        Self { version, files }
    }

    pub fn version(&self) -> ArtifactVersion {
        self.version
    }

    /// Content of one rule file.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// Rule file names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Produces a new artifact from the current state of the rule tree.
///
/// Called by the scheduler whenever the watcher reports a change. Errors are
/// logged by the caller and never stop the watch loop.
#[async_trait]
pub trait Rebuild: Send + Sync {
    async fn rebuild(&self) -> Result<ArtifactVersion, RebuildError>;
}
