// Plugin discovery and lifecycle management:
// - Recursive scan of a plugin root for library/executable modules
// - Descriptor check before any module code runs
// - Native loading through libloading with an ABI pre-check
// - Failures classified into legacy vs generic diagnostics
// - Ordered registry of live extensions, torn down in load order
pub mod api;
pub mod discovery;
pub mod error;
pub mod legacy;
pub mod lifecycle;
pub mod loader;
pub mod metadata;
pub mod registry;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::PluginsConfig;
use api::HostHandle;
use error::{Diagnostic, DiagnosticKind, DiscoveryError, LoadError, PluginError};
use legacy::CompatibilityDetector;
use loader::{DynamicLibraryLoader, ModuleLoader};
use metadata::{MetadataValidator, ModuleMetadata};
use registry::{ExtensionRecord, Registry};

/// Where the manager is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    /// No host handle yet
    Uninitialized,
    /// Host handle set, nothing loaded since the last unload
    Ready,
    /// At least one load pass ran since the last unload
    Loaded,
}

/// Outcome of one `load_all` pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    /// Files whose descriptor named our product
    pub found: usize,
    /// Extensions initialized and registered
    pub loaded: usize,
    /// Extensions that declined activation
    pub declined: usize,
    /// Files skipped for missing or foreign metadata
    pub skipped: usize,
    /// Warnings for the presentation layer
    pub diagnostics: Vec<Diagnostic>,
    /// Set when discovery aborted before producing candidates
    pub discovery_fault: Option<String>,
}

impl LoadReport {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Discovers, loads and tears down extension modules.
pub struct PluginManager {
    host: Option<HostHandle>,
    registry: Registry,
    loader: Box<dyn ModuleLoader>,
    validator: MetadataValidator,
    detector: CompatibilityDetector,
    extensions: Vec<String>,
    state: ManagerState,
}

impl PluginManager {
    /// Create a manager using native loading and default settings
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&PluginsConfig::default())
    }

    /// Create a manager from the `plugins` config section
    #[must_use]
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self {
            host: None,
            registry: Registry::new(),
            loader: Box::new(DynamicLibraryLoader::new()),
            validator: MetadataValidator::new(config.product_name.clone()),
            detector: CompatibilityDetector::new(config.legacy_marker.clone()),
            extensions: config.extensions.clone(),
            state: ManagerState::Uninitialized,
        }
    }

    /// Replace the module loader
    #[must_use]
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Set the host handle passed to every extension. Required before loading.
    pub fn initialize(&mut self, host: HostHandle) {
        self.host = Some(host);
        if self.state == ManagerState::Uninitialized {
            self.state = ManagerState::Ready;
        }
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtensionRecord> {
        self.registry.iter()
    }

    /// Candidates under `root` whose descriptor names our product, without
    /// loading or running any of them.
    pub fn scan(
        &self,
        root: impl AsRef<Path>,
    ) -> Result<Vec<(PathBuf, ModuleMetadata)>, DiscoveryError> {
        let candidates = discovery::discover(root.as_ref(), &self.extensions)?;
        Ok(candidates
            .into_iter()
            .filter_map(|path| {
                let metadata = self.validator.validate(&path)?;
                Some((path, metadata))
            })
            .collect())
    }

    /// Load every extension under `root` and append it to the registry.
    ///
    /// Repeated calls accumulate. Per-module failures never abort the pass;
    /// they are reported as diagnostics or skipped silently.
    ///
    /// # Errors
    /// Returns [`PluginError::HostNotInitialized`] if [`PluginManager::initialize`]
    /// has not been called.
    pub fn load_all(&mut self, root: impl AsRef<Path>) -> Result<LoadReport, PluginError> {
        let Some(host) = self.host.clone() else {
            error!("load_all called before the plugin host was initialized");
            return Err(PluginError::HostNotInitialized);
        };

        let root = root.as_ref();
        let mut report = LoadReport::default();

        let candidates = match discovery::discover(root, &self.extensions) {
            Ok(candidates) => candidates,
            Err(err) => {
                let err = anyhow::Error::new(err);
                error!("Plugin discovery aborted: {:#}", err);
                report.discovery_fault = Some(format!("{err:#}"));
                return Ok(report);
            }
        };

        info!("Loading plugins from: {}", root.display());
        for path in candidates {
            self.load_candidate(&path, &host, &mut report);
        }
        self.state = ManagerState::Loaded;

        info!(
            "Plugin loading complete: {} found, {} loaded, {} declined, {} incompatible",
            report.found,
            report.loaded,
            report.declined,
            report.diagnostics.len()
        );
        Ok(report)
    }

    fn load_candidate(&mut self, path: &Path, host: &HostHandle, report: &mut LoadReport) {
        let Some(metadata) = self.validator.validate(path) else {
            report.skipped += 1;
            return;
        };
        report.found += 1;

        let outcome = self.loader.load(path).and_then(|mut handle| {
            let activated = lifecycle::initialize(&mut handle, host, path)?;
            Ok(activated.then_some(handle))
        });

        match outcome {
            Ok(Some(handle)) => {
                let entry = loader::entry_name(path);
                info!("Loaded {} ({})", entry, path.display());
                self.registry.push(ExtensionRecord::new(
                    path.to_path_buf(),
                    metadata,
                    entry,
                    handle,
                ));
                report.loaded += 1;
            }
            Ok(None) => {
                debug!("{} declined activation", path.display());
                report.declined += 1;
            }
            Err(err) => {
                let diagnostic = self.classify(path, &err);
                warn!("Incompatible plugin ({:?}): {}", diagnostic.kind, err);
                report.diagnostics.push(diagnostic);
            }
        }
    }

    fn classify(&self, path: &Path, err: &LoadError) -> Diagnostic {
        let kind = if err.is_incompatible_format() && self.detector.is_legacy_module(path) {
            DiagnosticKind::IncompatibleLegacy
        } else {
            DiagnosticKind::IncompatibleGeneric
        };
        Diagnostic::new(kind, path, err.to_string())
    }

    /// Terminate every registered extension in load order, then clear the
    /// registry. A panicking extension does not stop the others.
    pub fn unload_all(&mut self) {
        if self.registry.is_empty() {
            if self.state == ManagerState::Loaded {
                self.state = ManagerState::Ready;
            }
            return;
        }

        let mut faults = 0;
        for record in self.registry.drain() {
            let (entry, handle) = record.into_handle();
            match lifecycle::terminate(handle, &entry) {
                Ok(()) => debug!("Terminated {}", entry),
                Err(fault) => {
                    error!("{}", fault);
                    faults += 1;
                }
            }
        }

        info!("All plugins unloaded ({} teardown fault(s))", faults);
        self.state = if self.host.is_some() {
            ManagerState::Ready
        } else {
            ManagerState::Uninitialized
        };
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.unload_all();
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("state", &self.state)
            .field("extensions", &self.extensions)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a PluginManager {
    type Item = &'a ExtensionRecord;
    type IntoIter = std::slice::Iter<'a, ExtensionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StandaloneHost;
    use std::sync::Arc;

    #[test]
    fn test_plugin_manager_creation() {
        let manager = PluginManager::new();
        assert_eq!(manager.len(), 0);
        assert_eq!(manager.state(), ManagerState::Uninitialized);
    }

    #[test]
    fn test_load_before_initialize_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = PluginManager::new();
        let err = manager.load_all(dir.path()).unwrap_err();
        assert!(matches!(err, PluginError::HostNotInitialized));
    }

    #[test]
    fn test_missing_root_is_a_no_op() {
        let mut manager = PluginManager::new();
        manager.initialize(Arc::new(StandaloneHost::new("test", "1.0.0")));

        let report = manager.load_all("/nonexistent/plugins").unwrap();
        assert!(report.discovery_fault.is_some());
        assert_eq!(report.found, 0);
        assert!(manager.is_empty());
        assert_eq!(manager.state(), ManagerState::Ready);
    }

    #[test]
    fn test_unload_on_empty_registry() {
        let mut manager = PluginManager::new();
        manager.unload_all();
        manager.unload_all();
        assert!(manager.is_empty());
        assert_eq!(manager.state(), ManagerState::Uninitialized);
    }
}
