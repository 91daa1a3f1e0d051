//! Manifest parser.
//!
//! Loads `cloudscale.yaml`, the `.env` file next to it and the
//! `CLOUDSCALE_*` environment overrides, with environment values taking
//! precedence over the file.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Manifest;

/// Variable holding the API token.
pub const ENV_API_TOKEN: &str = "CLOUDSCALE_API_TOKEN";

/// Variable overriding `api.url`.
pub const ENV_API_URL: &str = "CLOUDSCALE_API_URL";

/// Variable overriding `api.timeout_secs`.
pub const ENV_API_TIMEOUT: &str = "CLOUDSCALE_API_TIMEOUT";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory the `.env` file is looked up in.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory the `.env` file is looked up in.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            }
        })?;

        debug!("Manifest declares {} resource(s)", manifest.resources.len());
        Ok(manifest)
    }

    /// Applies `CLOUDSCALE_API_URL` and `CLOUDSCALE_API_TIMEOUT`.
    ///
    /// `lookup` resolves a variable name; pass `|name| std::env::var(name).ok()`
    /// to read the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a number of seconds.
    pub fn apply_env_overrides(
        manifest: &mut Manifest,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL) {
            debug!("Overriding api.url from environment");
            manifest.api.url = url;
        }

        if let Some(timeout) = lookup(ENV_API_TIMEOUT) {
            debug!("Overriding api.timeout_secs from environment");
            manifest.api.timeout_secs = timeout.trim().parse().map_err(|_| {
                ConfigError::validation(
                    format!("{ENV_API_TIMEOUT} must be a number of seconds, got: {timeout}"),
                    "api.timeout_secs",
                )
            })?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Returns the API token, preferring an explicit value.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured.
    pub fn api_token(
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        explicit
            .map(String::from)
            .or_else(|| lookup(ENV_API_TOKEN))
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingEnvVar {
                    name: String::from(ENV_API_TOKEN),
                }
                .into()
            })
    }
}

/// Manifest file names searched for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cloudscale.yaml", "cloudscale.yml"];

/// Finds the manifest in `start_dir` or its parents, then in the user's
/// configuration directory.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        if let Some(found) = find_in(&current) {
            return Ok(found);
        }
        if !current.pop() {
            break;
        }
    }

    if let Some(found) = dirs::config_dir()
        .map(|dir| dir.join("cloudscale"))
        .and_then(|dir| find_in(&dir))
    {
        return Ok(found);
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
        .inspect(|path| info!("Found manifest: {}", path.display()))
}
