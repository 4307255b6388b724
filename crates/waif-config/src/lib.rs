//! # waif config
//!
//! Job configuration for the OODA scheduler: the typed job model, a YAML
//! loader, and a validator that reports every violation with a located path
//! such as `jobs[2] (id:nightly).schedule`.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::{load_config, ConfigLoader, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
