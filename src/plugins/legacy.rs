//! Legacy-generation detection for modules that failed to load.
//!
//! This is a heuristic: a module counts as first-generation when its bytes
//! contain the old entry point name anywhere. Renamed or stripped legacy
//! modules slip through as generic failures.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::api::LEGACY_ENTRY_SYMBOL;

/// Offset of the first occurrence of `marker` in `haystack`.
///
/// An empty marker never matches.
#[must_use]
pub fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || marker.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(marker.len())
        .position(|window| window == marker)
}

/// Literal substring check over raw bytes
#[must_use]
pub fn contains_marker(haystack: &[u8], marker: &[u8]) -> bool {
    find_marker(haystack, marker).is_some()
}

/// Decides whether a failed module belongs to the previous plugin generation.
#[derive(Debug, Clone)]
pub struct CompatibilityDetector {
    marker: Vec<u8>,
}

impl CompatibilityDetector {
    #[must_use]
    pub fn new(marker: impl Into<Vec<u8>>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    #[must_use]
    pub fn marker(&self) -> &[u8] {
        &self.marker
    }

    #[must_use]
    pub fn is_legacy_bytes(&self, bytes: &[u8]) -> bool {
        contains_marker(bytes, &self.marker)
    }

    /// Re-read the module and look for the marker. I/O failures count as "not legacy".
    pub fn is_legacy_module(&self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(bytes) => {
                let legacy = self.is_legacy_bytes(&bytes);
                debug!("Legacy check for {}: {}", path.display(), legacy);
                legacy
            }
            Err(e) => {
                warn!("Could not re-read {} for legacy check: {}", path.display(), e);
                false
            }
        }
    }
}

impl Default for CompatibilityDetector {
    fn default() -> Self {
        Self::new(LEGACY_ENTRY_SYMBOL)
    }
}
