//! CLI command implementations.

pub mod check;
pub mod run;

pub use check::check_config;
pub use run::run_server;

use anyhow::{Context, Result};
use rfcserver_core::{ServerConfig, ServerParameters};
use std::path::Path;

/// Load the configuration file, applying a command-line `SYSID`
pub fn load_config(path: &Path, sysid: Option<&str>) -> Result<ServerConfig> {
    let mut overrides = ServerParameters::new();
    if let Some(sysid) = sysid {
        overrides.insert(rfcserver_core::config::SYSID, sysid);
    }
    ServerConfig::from_file_with(path, &overrides)
        .with_context(|| format!("Failed to load configuration {:?}", path))
}
