use miette::Result;
use miette::miette;
use quire_core::SessionConfig;
use quire_renderer::SanitizerConfig;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

pub const ENDPOINT_VAR: &str = "QUIRE_ENDPOINT";
pub const API_KEY_VAR: &str = "QUIRE_API_KEY";
pub const AUTOSAVE_VAR: &str = "QUIRE_AUTOSAVE_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The GraphQL endpoint of the editor service.
    pub endpoint: String,
    /// Sent as the `x-api-key` header when set.
    pub api_key: Option<String>,
    /// Quiet period between the last edit and the autosave.
    pub autosave_quiet_ms: u64,
    /// Applies to each request as a whole, including reading the body.
    pub request_timeout_secs: u64,
    /// Hosts the preview lets iframes load from.
    pub allowed_iframe_hosts: Vec<SmolStr>,
}

impl Default for Config {
    /// Points at a service on localhost with the development key unset.
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/graphql".to_owned(),
            api_key: None,
            autosave_quiet_ms: 650,
            request_timeout_secs: 30,
            allowed_iframe_hosts: SanitizerConfig::default().allowed_iframe_hosts,
        }
    }
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette!("Failed to load configuration: {e}"))
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver
            .save(self)
            .await
            .map_err(|e| miette!("Failed to save configuration: {e}"))
    }

    /// Defaults overridden by `QUIRE_ENDPOINT`, `QUIRE_API_KEY` and
    /// `QUIRE_AUTOSAVE_MS`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply environment-style overrides looked up through `var`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(endpoint) = var(ENDPOINT_VAR).filter(|v| !v.is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(key) = var(API_KEY_VAR).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(ms) = var(AUTOSAVE_VAR) {
            self.autosave_quiet_ms = ms.trim().parse().map_err(|_| {
                miette!("{AUTOSAVE_VAR} must be a whole number of milliseconds, got {ms:?}")
            })?;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            quiet_period: Duration::from_millis(self.autosave_quiet_ms),
        }
    }

    pub fn sanitizer(&self) -> SanitizerConfig {
        SanitizerConfig {
            allowed_iframe_hosts: self.allowed_iframe_hosts.clone(),
        }
    }

    /// `<config dir>/quire/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("quire").join("config.toml"))
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(
        &self,
    ) -> impl Future<
        Output = core::result::Result<Config, Box<dyn std::error::Error + Send + Sync + 'static>>,
    > + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(
        &self,
        config: &Config,
    ) -> impl Future<
        Output = core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    > + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// The format follows the file extension: `.json` or `.toml`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Loader for FileStore {
    async fn load(
        &self,
    ) -> core::result::Result<Config, Box<dyn std::error::Error + Send + Sync + 'static>> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(&self.path)?)?),
            Some("toml") => Ok(toml::from_str(&std::fs::read_to_string(&self.path)?)?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}

impl Saver for FileStore {
    async fn save(
        &self,
        config: &Config,
    ) -> core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(std::fs::write(
                &self.path,
                serde_json::to_string_pretty(config)?,
            )?),
            Some("toml") => Ok(std::fs::write(&self.path, toml::to_string_pretty(config)?)?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}
