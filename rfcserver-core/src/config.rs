//! Server parameters and configuration files

use crate::error::ConfigError;
use rfcserver_types::{FunctionName, SystemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Key identifying the logical backend system
pub const SYSID: &str = "SYSID";

/// Connection parameters passed to the backend when creating a server
///
/// Keys are case-insensitive and stored upper-case. `SYSID` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ServerParameters {
    values: BTreeMap<String, String>,
}

impl ServerParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value for the same key
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(key.as_ref().trim().to_uppercase(), value.into());
        self
    }

    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.trim().to_uppercase())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve the mandatory `SYSID` parameter
    pub fn system_id(&self) -> Result<SystemId, ConfigError> {
        match self.get(SYSID).map(str::trim) {
            Some(id) if !id.is_empty() => Ok(SystemId::new(id)),
            _ => Err(ConfigError::MissingSystemId),
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ServerParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl From<BTreeMap<String, String>> for ServerParameters {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<ServerParameters> for BTreeMap<String, String> {
    fn from(params: ServerParameters) -> Self {
        params.values
    }
}

/// Server configuration file (`rfcserver.yml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub parameters: ServerParameters,

    /// Timeout handed to the backend when stopping the server
    #[serde(default)]
    pub stop_timeout_ms: u32,

    /// Functions to register when the server is created
    #[serde(default)]
    pub functions: Vec<FunctionName>,
}

impl ServerConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with(path, &ServerParameters::new())
    }

    /// Load a configuration file, letting `overrides` replace file parameters
    ///
    /// Validation runs after the overrides are applied, so a `SYSID` given on
    /// the command line satisfies a file that has none.
    pub fn from_file_with(path: impl AsRef<Path>, overrides: &ServerParameters) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: Arc::new(e),
        })?;

        let mut config: ServerConfig = serde_yaml::from_str(&content)?;
        for (key, value) in overrides.iter() {
            config.parameters.insert(key, value);
        }
        config.parameters.system_id()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_yaml::from_str(content)?;
        config.parameters.system_id()?;
        Ok(config)
    }

    pub fn system_id(&self) -> Result<SystemId, ConfigError> {
        self.parameters.system_id()
    }
}
