//! Service configuration
//!
//! Settings come from environment variables, optionally layered over a TOML
//! file. A dotenv file can seed the environment first with [`load_dotenv`].
//! The store region and table are required; everything else has a default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names
pub mod env {
    pub const AWS_REGION: &str = "AWS_REGION";
    pub const DYNAMODB_TABLE: &str = "DYNAMODB_TABLE";
    pub const DYNAMODB_ENDPOINT: &str = "DYNAMODB_ENDPOINT";
    pub const BIND: &str = "MSENSE_BIND";
    pub const MODEL_DIR: &str = "MSENSE_MODEL_DIR";
    pub const REFRESH_SECS: &str = "MSENSE_REFRESH_SECS";
    pub const RETRY_SECS: &str = "MSENSE_RETRY_SECS";
    pub const REQUIRE_ARTIFACTS: &str = "MSENSE_REQUIRE_ARTIFACTS";
    pub const REQUEST_TIMEOUT_SECS: &str = "MSENSE_REQUEST_TIMEOUT_SECS";
}

/// Telemetry store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store region identifier
    pub region: String,
    /// Store table name
    pub table: String,
    /// Endpoint override (local store, proxies, tests)
    pub endpoint: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl StoreConfig {
    #[inline]
    #[must_use]
    pub fn new(region: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            table: table.into(),
            endpoint: None,
            request_timeout_secs: 10,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Full service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Telemetry store
    pub store: StoreConfig,
    /// HTTP listen address
    pub bind: SocketAddr,
    /// Directory holding the scoring artifacts
    pub model_dir: PathBuf,
    /// Steady-state refresh interval in seconds
    pub refresh_interval_secs: u64,
    /// Retry interval after a failed cycle, in seconds
    pub retry_interval_secs: u64,
    /// Treat missing scoring artifacts as fatal at startup
    pub require_artifacts: bool,
}

impl ServiceConfig {
    /// Create configuration with defaults for everything but the store
    #[must_use]
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            bind: SocketAddr::from(([0, 0, 0, 0], 5001)),
            model_dir: PathBuf::from("models"),
            refresh_interval_secs: 300,
            retry_interval_secs: 60,
            require_artifacts: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_intervals(mut self, refresh_secs: u64, retry_secs: u64) -> Self {
        self.refresh_interval_secs = refresh_secs;
        self.retry_interval_secs = retry_secs;
        self
    }

    #[inline]
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[inline]
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Load from the process environment, optionally over a TOML file
    ///
    /// # Errors
    /// Fails if a required setting is absent or any value is invalid
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => PartialConfig::from_file(path)?,
            None => PartialConfig::default(),
        };
        Self::from_lookup(base, |key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup layered over `base`
    ///
    /// # Errors
    /// Fails if a required setting is absent or any value is invalid
    pub fn from_lookup<F>(base: PartialConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let region = get(env::AWS_REGION).or(base.region);
        let table = get(env::DYNAMODB_TABLE).or(base.table);

        let (region, table) = match (region, table) {
            (Some(region), Some(table)) => (region, table),
            (region, table) => {
                let mut missing = Vec::new();
                if region.is_none() {
                    missing.push(env::AWS_REGION.to_string());
                }
                if table.is_none() {
                    missing.push(env::DYNAMODB_TABLE.to_string());
                }
                return Err(ConfigError::Missing(missing));
            }
        };

        let mut store = StoreConfig::new(region, table);
        store.endpoint = get(env::DYNAMODB_ENDPOINT).or(base.endpoint);
        if let Some(secs) = parse_opt(env::REQUEST_TIMEOUT_SECS, get(env::REQUEST_TIMEOUT_SECS))?
            .or(base.request_timeout_secs)
        {
            store.request_timeout_secs = secs;
        }

        let mut config = Self::new(store);
        if let Some(bind) = parse_opt(env::BIND, get(env::BIND))?.or(base.bind) {
            config.bind = bind;
        }
        if let Some(dir) = get(env::MODEL_DIR).map(PathBuf::from).or(base.model_dir) {
            config.model_dir = dir;
        }
        if let Some(secs) =
            parse_opt(env::REFRESH_SECS, get(env::REFRESH_SECS))?.or(base.refresh_secs)
        {
            config.refresh_interval_secs = secs;
        }
        if let Some(secs) = parse_opt(env::RETRY_SECS, get(env::RETRY_SECS))?.or(base.retry_secs) {
            config.retry_interval_secs = secs;
        }
        if let Some(flag) = parse_flag(get(env::REQUIRE_ARTIFACTS))?.or(base.require_artifacts) {
            config.require_artifacts = flag;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Rejects zero intervals and zero request timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::invalid(env::REFRESH_SECS, "must be > 0"));
        }
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::invalid(env::RETRY_SECS, "must be > 0"));
        }
        if self.store.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(env::REQUEST_TIMEOUT_SECS, "must be > 0"));
        }
        Ok(())
    }
}

/// Optional settings read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub region: Option<String>,
    pub table: Option<String>,
    pub endpoint: Option<String>,
    pub bind: Option<SocketAddr>,
    pub model_dir: Option<PathBuf>,
    pub refresh_secs: Option<u64>,
    pub retry_secs: Option<u64>,
    pub require_artifacts: Option<bool>,
    pub request_timeout_secs: Option<u64>,
}

impl PartialConfig {
    /// Parse a TOML config file
    ///
    /// # Errors
    /// Fails if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Load a dotenv file into the process environment
///
/// Variables already set keep their values. Without an explicit path `.env`
/// is searched for from the working directory upward, and not finding one is
/// not an error. Returns the file that was loaded.
///
/// # Errors
/// Fails if the file cannot be parsed, or an explicit path cannot be read
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|source| ConfigError::DotEnv {
                path: path.display().to_string(),
                source,
            }),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(source) => Err(ConfigError::DotEnv {
                path: ".env".to_string(),
                source,
            }),
        },
    }
}

fn parse_opt<T>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| v.trim().parse::<T>().map_err(|e| ConfigError::invalid(key, e.to_string())))
        .transpose()
}

fn parse_flag(value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::invalid(
                env::REQUIRE_ARTIFACTS,
                format!("expected a boolean, got {other:?}"),
            )),
        })
        .transpose()
}
