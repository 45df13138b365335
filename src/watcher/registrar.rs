//! Recursive registration of a directory tree with a watch backend.

use std::path::Path;

use walkdir::WalkDir;

use super::backend::WatchBackend;
use super::error::WatchError;
use super::event::WatchKey;
use super::registry::RegistrationTable;

/// Subscribe a single directory and record it in the table.
pub(crate) fn register<B: WatchBackend>(
    backend: &mut B,
    table: &RegistrationTable,
    dir: &Path,
) -> Result<WatchKey, WatchError> {
    let key = backend.register(dir)?;
    table.insert(key, dir.to_path_buf());
    crate::debug_event!("watcher", "registered", "{} {}", key, dir.display());
    Ok(key)
}

/// Subscribe `start` and every directory below it.
///
/// Symbolic links are never followed, so a directory reachable only through
/// a link is not registered. Any walk error aborts the whole operation.
///
/// Returns the number of directories registered.
pub(crate) fn register_all<B: WatchBackend>(
    backend: &mut B,
    table: &RegistrationTable,
    start: &Path,
) -> Result<usize, WatchError> {
    let mut count = 0;

    for entry in WalkDir::new(start).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            register(backend, table, entry.path())?;
            count += 1;
        }
    }

    Ok(count)
}
