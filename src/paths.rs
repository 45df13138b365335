//! Path helpers for naming files inside a rule tree.

use std::path::{Component, Path};

/// Express `path` relative to `base` using `/` separators on every platform.
///
/// Returns `None` when `path` is not strictly below `base`. The comparison is
/// per component, so `/rules-old/a.drl` is not under `/rules`.
pub fn relative_path(path: &Path, base: &Path) -> Option<String> {
    let rest = path.strip_prefix(base).ok()?;

    let parts: Vec<String> = rest
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}
