//! Configuration loader.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;
use crate::schema::JobsConfig;
use crate::validator::ConfigValidator;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".waif/ooda-scheduler.yaml";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV_VAR: &str = "WAIF_CONFIG";

/// Load and validate a job configuration file.
pub fn load_config(path: &Path) -> Result<JobsConfig, ConfigError> {
    ConfigLoader::load(path)
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the configuration path: explicit flag, then `WAIF_CONFIG`,
    /// then [`DEFAULT_CONFIG_PATH`].
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        Self::resolve_path_with(explicit, std::env::var_os(CONFIG_ENV_VAR))
    }

    fn resolve_path_with(explicit: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match env_value {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<JobsConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::from_io(path, e))?;
        Self::load_str(&content, path)
    }

    /// Load configuration from a string. `origin` is used in error messages.
    pub fn load_str(content: &str, origin: &Path) -> Result<JobsConfig, ConfigError> {
        let document = Self::parse_document(content, origin)?;

        let result = ConfigValidator::validate(&document);
        if !result.is_valid() {
            return Err(ConfigError::Invalid {
                path: origin.to_path_buf(),
                errors: result.errors,
            });
        }

        serde_json::from_value(document).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse YAML into a generic document.
    fn parse_document(content: &str, origin: &Path) -> Result<Value, ConfigError> {
        serde_yml::from_str::<Value>(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }
}
