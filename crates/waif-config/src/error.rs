//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {} (expected an ooda scheduler YAML file)", .path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied reading config file: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration in {}:\n{}", .path.display(), format_errors(.errors))]
    Invalid {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },
}

impl ConfigError {
    /// Build the right variant for an I/O failure on `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => ConfigError::PermissionDenied { path },
            _ => ConfigError::Io { path, source },
        }
    }

    /// Validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Invalid { errors, .. } => errors,
            _ => &[],
        }
    }
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
