//! Config loading, validation, and resolution.

use super::model::Config;
use crate::error::{NsLockError, Result};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "NSLOCK_CONFIG";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(NsLockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            NsLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| NsLockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            NsLockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `session_timeout_ms` must be positive
    /// - `poll_interval_ms` must be positive and at most a third of the session timeout
    /// - `default_timeout_ms`, if set, must be positive
    /// - `contender_prefix` must be a plain node name that does not end in a digit
    /// - `acl` must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 {
            return Err(invalid("session_timeout_ms must be greater than 0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than 0"));
        }
        if self.poll_interval_ms.saturating_mul(3) > self.session_timeout_ms {
            return Err(invalid(&format!(
                "poll_interval_ms ({}) must be at most a third of session_timeout_ms ({})",
                self.poll_interval_ms, self.session_timeout_ms
            )));
        }

        if self.default_timeout_ms == Some(0) {
            return Err(invalid(
                "default_timeout_ms must be greater than 0 (omit it to wait indefinitely)",
            ));
        }

        let prefix = &self.contender_prefix;
        if prefix.is_empty() {
            return Err(invalid("contender_prefix must be non-empty"));
        }
        if prefix.contains('/') {
            return Err(invalid(&format!(
                "contender_prefix must not contain '/' (found '{}')",
                prefix
            )));
        }
        if prefix.starts_with('.') {
            return Err(invalid(&format!(
                "contender_prefix must not start with '.' (found '{}')",
                prefix
            )));
        }
        if prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid(&format!(
                "contender_prefix must not end with a digit (found '{}')",
                prefix
            )));
        }

        if self.acl.entries().is_empty() {
            return Err(invalid("acl must contain at least one entry"));
        }

        Ok(())
    }

    /// Pick the config to use: the file given on the command line, else the
    /// file named by `NSLOCK_CONFIG`, else the defaults.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let env_value = std::env::var_os(CONFIG_ENV_VAR);
        Self::resolve_from(cli_path, env_value.as_deref().map(Path::new))
    }

    pub(crate) fn resolve_from(cli_path: Option<&Path>, env_path: Option<&Path>) -> Result<Self> {
        match cli_path.or(env_path.filter(|p| !p.as_os_str().is_empty())) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(reason: &str) -> NsLockError {
    NsLockError::UserError(format!("config validation failed: {}", reason))
}
