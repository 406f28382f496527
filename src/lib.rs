//! Kindling - extension discovery and lifecycle host
//!
//! This library finds extension modules under a directory tree, checks the
//! product descriptor embedded in each file, loads the ones that belong to
//! this host and keeps them in an ordered registry until they are unloaded.
//!
//! # Modules
//!
//! - [`plugins`]: Discovery, loading, lifecycle and registry of extensions
//! - [`config`]: Configuration management and serialization
//! - [`host`]: Standalone host handle handed to extensions
//! - [`crypto_random`]: Cryptographically strong random bytes

pub mod config;
pub mod crypto_random;
pub mod host;
pub mod plugins;

pub use plugins::api::{Extension, HostHandle, PluginHost};
pub use plugins::{LoadReport, ManagerState, PluginManager};
