//! Manifest handling.
//!
//! - Parsing `cloudscale.yaml` and the `CLOUDSCALE_*` environment overrides
//! - Validating every resource entry before any network call

mod parser;
mod spec;
mod validator;

pub use parser::{
    find_config_file, ConfigParser, DEFAULT_CONFIG_FILES, ENV_API_TIMEOUT, ENV_API_TOKEN,
    ENV_API_URL,
};
pub use spec::{ApiConfig, Manifest};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
