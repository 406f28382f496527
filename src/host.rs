//! Minimal host capability for running the plugin manager outside an application.

use std::path::{Path, PathBuf};

use crate::plugins::api::PluginHost;

/// Host handle carrying only identity and the plugin directory
#[derive(Debug, Clone)]
pub struct StandaloneHost {
    name: String,
    version: String,
    plugin_dir: Option<PathBuf>,
}

impl StandaloneHost {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            plugin_dir: None,
        }
    }

    #[must_use]
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }
}

impl Default for StandaloneHost {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl PluginHost for StandaloneHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn plugin_dir(&self) -> Option<&Path> {
        self.plugin_dir.as_deref()
    }
}
