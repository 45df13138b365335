//! Builds rule artifacts from layered directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use walkdir::WalkDir;

use super::{ArtifactVersion, Rebuild, RebuildError, RuleArtifact};
use crate::config::Settings;
use crate::paths::relative_path;

/// Reads every rule file from its layers and publishes the result as the
/// current artifact.
///
/// Layers are read in order; a file in a later layer replaces a file with
/// the same name from an earlier one. A failed build leaves the previously
/// published artifact in place.
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    layers: Vec<PathBuf>,
    current: RwLock<Option<Arc<RuleArtifact>>>,
}

impl RuleSetBuilder {
    /// Create a builder with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory layer on top of the existing ones.
    pub fn with_layer(mut self, dir: impl Into<PathBuf>) -> Self {
        self.layers.push(dir.into());
        self
    }

    /// Bundled rules first, then the watched rules directory.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new();
        if let Some(bundled) = &settings.rules.bundled_dir {
            builder = builder.with_layer(bundled);
        }
        if let Some(root) = &settings.watch.root {
            builder = builder.with_layer(root);
        }
        builder
    }

    pub fn layers(&self) -> &[PathBuf] {
        &self.layers
    }

    /// The most recently published artifact.
    pub fn current(&self) -> Option<Arc<RuleArtifact>> {
        self.current.read().clone()
    }

    /// Build and publish synchronously.
    pub fn build(&self) -> Result<Arc<RuleArtifact>, RebuildError> {
        let files = collect_layers(&self.layers)?;
        Ok(self.publish(files))
    }

    fn publish(&self, files: BTreeMap<String, String>) -> Arc<RuleArtifact> {
        let mut current = self.current.write();

        let now = Utc::now().timestamp_millis().max(0) as u64;
        let version = match current.as_ref() {
            Some(previous) => now.max(previous.version().as_millis() + 1),
            None => now,
        };

        let artifact = Arc::new(RuleArtifact::new(ArtifactVersion::new(version), files));
        crate::log_event!(
            "builder",
            "built",
            "{} with {} files",
            artifact.version(),
            artifact.len()
        );

        if let Some(previous) = current.replace(artifact.clone()) {
            crate::debug_event!("builder", "retired", "{}", previous.version());
        }

        artifact
    }
}

#[async_trait]
impl Rebuild for RuleSetBuilder {
    async fn rebuild(&self) -> Result<ArtifactVersion, RebuildError> {
        let layers = self.layers.clone();
        let files = tokio::task::spawn_blocking(move || collect_layers(&layers))
            .await
            .map_err(|e| RebuildError::Task {
                reason: e.to_string(),
            })??;

        Ok(self.publish(files).version())
    }
}

fn collect_layers(layers: &[PathBuf]) -> Result<BTreeMap<String, String>, RebuildError> {
    let mut files = BTreeMap::new();
    for layer in layers {
        collect_layer(layer, &mut files)?;
    }
    Ok(files)
}

/// Read every regular file under `layer` into `files`.
fn collect_layer(layer: &Path, files: &mut BTreeMap<String, String>) -> Result<(), RebuildError> {
    if !layer.is_dir() {
        return Err(RebuildError::MissingRoot {
            path: layer.to_path_buf(),
        });
    }

    for entry in WalkDir::new(layer).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(name) = relative_path(path, layer) else {
            continue;
        };

        let bytes = std::fs::read(path).map_err(|source| RebuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|_| RebuildError::InvalidEncoding {
            path: path.to_path_buf(),
        })?;

        if content.trim().is_empty() {
            tracing::warn!("[builder] empty rule file {}", path.display());
        }

        crate::debug_event!("builder", "added", "{} as {name}", path.display());
        if files.insert(name, content).is_some() {
            crate::debug_event!("builder", "overridden", "{}", path.display());
        }
    }

    Ok(())
}
