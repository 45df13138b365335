use std::path::PathBuf;
use thiserror::Error;

/// Errors from building a rule artifact.
#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("Rule directory {path} does not exist")]
    MissingRoot { path: PathBuf },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rule file {path} is not valid UTF-8")]
    InvalidEncoding { path: PathBuf },

    #[error("Build task failed: {reason}")]
    Task { reason: String },
}

impl From<walkdir::Error> for RebuildError {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(PathBuf::from).unwrap_or_default();
        RebuildError::Io {
            path,
            source: e.into(),
        }
    }
}
