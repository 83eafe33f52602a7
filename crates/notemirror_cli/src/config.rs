//! Configuration file and flag resolution.

use notemirror_sync::DEFAULT_BLOCK_SIZE;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A required setting is absent from both the file and the flags.
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

/// Credentials for one environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Developer token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Base URL of the gateway.
    #[serde(default)]
    pub service_url: Option<String>,
}

/// Contents of the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Use the development (sandbox) environment.
    #[serde(default)]
    pub development_mode: bool,
    /// Sandbox credentials.
    #[serde(default)]
    pub development: Environment,
    /// Production credentials.
    #[serde(default)]
    pub production: Environment,
    /// Archive root.
    #[serde(default)]
    pub out_folder: Option<PathBuf>,
    /// Chunk size for metadata requests.
    #[serde(default)]
    pub block_size: Option<u32>,
    /// Log debug output.
    #[serde(default)]
    pub verbose: bool,
}

impl MirrorConfig {
    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a config file if a path was given.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Returns the credentials of the active environment.
    pub fn environment(&self, sandbox: bool) -> &Environment {
        if sandbox || self.development_mode {
            &self.development
        } else {
            &self.production
        }
    }
}

/// Flags that override the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--out`.
    pub out: Option<PathBuf>,
    /// `--token`.
    pub token: Option<String>,
    /// `--service-url`.
    pub service_url: Option<String>,
    /// `--sandbox`.
    pub sandbox: bool,
    /// `--block-size`.
    pub block_size: Option<u32>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Archive root.
    pub out: PathBuf,
    /// Developer token, if any.
    pub token: Option<String>,
    /// Gateway base URL, if any.
    pub service_url: Option<String>,
    /// Chunk size.
    pub block_size: u32,
}

impl Settings {
    /// Merges flags over the config file.
    pub fn resolve(config: &MirrorConfig, overrides: Overrides) -> Result<Self, ConfigError> {
        let env = config.environment(overrides.sandbox);
        let out = overrides
            .out
            .or_else(|| config.out_folder.clone())
            .ok_or(ConfigError::Missing("outFolder (or --out)"))?;
        Ok(Self {
            out,
            token: overrides.token.or_else(|| env.auth_token.clone()),
            service_url: overrides.service_url.or_else(|| env.service_url.clone()),
            block_size: overrides
                .block_size
                .or(config.block_size)
                .unwrap_or(DEFAULT_BLOCK_SIZE),
        })
    }

    /// Returns the token or an error naming the setting.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .as_deref()
            .ok_or(ConfigError::Missing("authToken (or --token / NOTEMIRROR_TOKEN)"))
    }

    /// Returns the service URL or an error naming the setting.
    pub fn require_service_url(&self) -> Result<&str, ConfigError> {
        self.service_url
            .as_deref()
            .ok_or(ConfigError::Missing("serviceUrl (or --service-url)"))
    }
}
