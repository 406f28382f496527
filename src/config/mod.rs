use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::api::{DEFAULT_PRODUCT_NAME, LEGACY_ENTRY_SYMBOL};
use crate::plugins::discovery::DEFAULT_EXTENSIONS;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin root; falls back to `plugins/` next to the executable
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Product name a module descriptor must declare
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Byte marker identifying first-generation modules (empty disables the check)
    #[serde(default = "default_legacy_marker")]
    pub legacy_marker: String,

    /// File extensions scanned, in discovery order
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

// Default value functions
fn default_product_name() -> String {
    DEFAULT_PRODUCT_NAME.to_string()
}

fn default_legacy_marker() -> String {
    LEGACY_ENTRY_SYMBOL.to_string()
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            product_name: default_product_name(),
            legacy_marker: default_legacy_marker(),
            extensions: default_extensions(),
        }
    }
}

impl PluginsConfig {
    /// Configured plugin root, or `plugins/` beside the running binary
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.directory {
            return Ok(dir.clone());
        }
        default_plugin_dir()
    }
}

/// `plugins/` in the directory containing the current executable
pub fn default_plugin_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("Failed to determine executable path")?;
    let dir = exe_path
        .parent()
        .context("Executable has no parent directory")?;
    Ok(dir.join("plugins"))
}

impl Config {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".kindling").join("config.yaml"))
    }
}
