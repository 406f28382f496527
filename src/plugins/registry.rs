use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::api::Extension;
use super::loader::ExtensionHandle;
use super::metadata::ModuleMetadata;

/// Bookkeeping for one initialized, not yet terminated extension
#[derive(Debug)]
pub struct ExtensionRecord {
    path: PathBuf,
    metadata: ModuleMetadata,
    entry_name: String,
    loaded_at: DateTime<Utc>,
    handle: ExtensionHandle,
}

impl ExtensionRecord {
    #[must_use]
    pub fn new(
        path: PathBuf,
        metadata: ModuleMetadata,
        entry_name: String,
        handle: ExtensionHandle,
    ) -> Self {
        Self {
            path,
            metadata,
            entry_name,
            loaded_at: Utc::now(),
            handle,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    #[must_use]
    pub fn extension(&self) -> &dyn Extension {
        self.handle.extension()
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.handle.is_dynamic()
    }

    /// Give up the record, keeping the entry name for teardown reporting
    pub(crate) fn into_handle(self) -> (String, ExtensionHandle) {
        (self.entry_name, self.handle)
    }
}

/// Live extensions in discovery order.
///
/// Duplicate paths are allowed. Clearing drops records without terminating
/// them; teardown is the manager's job.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<ExtensionRecord>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExtensionRecord) {
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtensionRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record loaded from `path`
    #[must_use]
    pub fn find(&self, path: &Path) -> Option<&ExtensionRecord> {
        self.records.iter().find(|record| record.path == path)
    }

    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.records.iter().map(ExtensionRecord::path).collect()
    }

    /// Hand out every record in order, leaving the registry empty
    pub fn drain(&mut self) -> std::vec::Drain<'_, ExtensionRecord> {
        self.records.drain(..)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a ExtensionRecord;
    type IntoIter = std::slice::Iter<'a, ExtensionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
