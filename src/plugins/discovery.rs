//! Candidate enumeration under a plugin root.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::error::DiscoveryError;

/// Extensions scanned by default: libraries first, then executables
pub const DEFAULT_EXTENSIONS: &[&str] = &["dll", "so", "dylib", "exe"];

/// Strip `*.` / `.` prefixes so `"*.dll"`, `".dll"` and `"dll"` are equivalent.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    extension
        .trim()
        .trim_start_matches('*')
        .trim_start_matches('.')
        .to_ascii_lowercase()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Recursively list files under `root` matching `extensions`.
///
/// Results are grouped by extension in the given order; within a group files
/// appear in walk order, sorted by name per directory. Symlinked directories
/// are followed. Any I/O error, including a symlink loop, aborts the whole
/// scan so that no partial candidate list is ever produced.
pub fn discover<S: AsRef<str>>(
    root: &Path,
    extensions: &[S],
) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| DiscoveryError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.path().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut candidates = Vec::new();
    for extension in extensions {
        let extension = normalize_extension(extension.as_ref());
        if extension.is_empty() {
            continue;
        }
        candidates.extend(
            files
                .iter()
                .filter(|path| has_extension(path, &extension))
                .cloned(),
        );
    }

    debug!(
        "Discovered {} candidate(s) among {} file(s) under {}",
        candidates.len(),
        files.len(),
        root.display()
    );
    Ok(candidates)
}
