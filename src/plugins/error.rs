use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a candidate module could not be turned into a live extension.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The module cannot be loaded under this host's binary contract
    /// (not a loadable library, wrong target, missing or mismatched ABI version).
    #[error("{} cannot be loaded by this host: {reason}", .path.display())]
    IncompatibleFormat { path: PathBuf, reason: String },

    /// The module loaded but does not provide a usable extension instance.
    #[error("{} does not provide a usable `{entry}`: {reason}", .path.display())]
    InvalidExtensionType {
        path: PathBuf,
        entry: String,
        reason: String,
    },

    /// Anything else, including panics in the constructor or in `initialize`.
    #[error("{} failed to load: {reason}", .path.display())]
    LoadFailed { path: PathBuf, reason: String },
}

impl LoadError {
    /// Path of the module that failed
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::IncompatibleFormat { path, .. }
            | Self::InvalidExtensionType { path, .. }
            | Self::LoadFailed { path, .. } => path,
        }
    }

    /// Whether the failure is a structural mismatch worth a legacy check
    #[must_use]
    pub fn is_incompatible_format(&self) -> bool {
        matches!(self, Self::IncompatibleFormat { .. })
    }
}

/// An extension panicked while being terminated or dropped.
#[derive(Debug, Error)]
#[error("extension `{entry}` panicked during teardown: {message}")]
pub struct TeardownFault {
    pub entry: String,
    pub message: String,
}

/// Discovery could not produce a candidate list.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("plugin root {} does not exist or is not a directory", .0.display())]
    MissingRoot(PathBuf),

    #[error("failed to enumerate plugin root {}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Misuse of the plugin manager by its host.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin host handle is not set; call PluginManager::initialize before loading")]
    HostNotInitialized,
}

/// Message class surfaced to the host's presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// Load failed and the module looks like a first-generation plugin
    IncompatibleLegacy,
    /// Load failed for any other reason
    IncompatibleGeneric,
}

/// User-facing warning about one module.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: PathBuf,
    /// Underlying load error, for logs and verbose output
    pub detail: String,
}

const INCOMPATIBLE: &str = "The following plugin is incompatible with the current host version:";
const LEGACY_HINT: &str = "This plugin was built for the first-generation plugin interface. \
     Such plugins cannot be loaded by this host; check the plugin's website for a \
     version built against the current interface.";
const UPDATE_HINT: &str = "Have a look at the plugin's website for an appropriate version.";

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Render the warning text naming the file
    #[must_use]
    pub fn message(&self) -> String {
        let hint = match self.kind {
            DiagnosticKind::IncompatibleLegacy => LEGACY_HINT,
            DiagnosticKind::IncompatibleGeneric => UPDATE_HINT,
        };
        format!("{INCOMPATIBLE}\n{}\n\n{hint}", self.path.display())
    }
}
