//! TOML-based configuration for notemerge.
//!
//! Secrets are never written in the file itself. They are referenced through
//! `_env` fields naming an environment variable and resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::merge::MarkerLabels;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process settings: logging and data directory.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// HTTP API settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Merge engine settings.
    #[serde(default)]
    pub merge: MergeConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding `notemerge.db`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// When set, logs also go to a daily rolling file in this directory.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/notemerge")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            log_dir: None,
        }
    }
}

impl DaemonConfig {
    /// Path of the SQLite database inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("notemerge.db")
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Listen address (default `127.0.0.1:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Environment variable holding the login password. When the variable
    /// resolves, every API call needs a session token.
    #[serde(default)]
    pub admin_password_env: Option<String>,

    /// Session lifetime in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,

    /// Maximum accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Resolved login password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub admin_password: Option<String>,
}

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_HOURS: u64 = 24 * 366;

fn default_listen() -> String {
    "127.0.0.1:3000".into()
}
fn default_session_ttl_hours() -> u64 {
    24
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin_password_env: None,
            session_ttl_hours: default_session_ttl_hours(),
            max_body_bytes: default_max_body_bytes(),
            admin_password: None,
        }
    }
}

impl WebConfig {
    /// Whether callers must log in. Without a password the API trusts the
    /// `X-User-Id` header.
    pub fn auth_enabled(&self) -> bool {
        self.admin_password.is_some()
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Labels printed after conflict marker sigils.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_source_label")]
    pub source_label: String,
    #[serde(default = "default_base_label")]
    pub base_label: String,
    #[serde(default = "default_target_label")]
    pub target_label: String,
}

fn default_source_label() -> String {
    "source".into()
}
fn default_base_label() -> String {
    "base".into()
}
fn default_target_label() -> String {
    "target".into()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            source_label: default_source_label(),
            base_label: default_base_label(),
            target_label: default_target_label(),
        }
    }
}

impl MergeConfig {
    pub fn marker_labels(&self) -> MarkerLabels {
        MarkerLabels {
            source: self.source_label.clone(),
            base: self.base_label.clone(),
            target: self.target_label.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading, resolution, validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does not fail.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.web.admin_password_env {
            self.web.admin_password = resolve_optional_env(env_name, "web.admin_password_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "web.listen".into(),
                detail: "listen address must not be empty".into(),
            });
        }
        if self.web.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "web.session_ttl_hours".into(),
                detail: "session TTL must be > 0".into(),
            });
        }
        if self.web.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                field: "web.session_ttl_hours".into(),
                detail: format!("session TTL must be at most {MAX_SESSION_TTL_HOURS} hours"),
            });
        }
        for (field, label) in [
            ("merge.source_label", &self.merge.source_label),
            ("merge.base_label", &self.merge.base_label),
            ("merge.target_label", &self.merge.target_label),
        ] {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "marker label must not be empty".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Render a commented starter config.
    pub fn sample() -> &'static str {
        SAMPLE_CONFIG
    }
}

const SAMPLE_CONFIG: &str = r#"# notemerge configuration

[daemon]
log_level = "info"
data_dir = "/var/lib/notemerge"
# log_dir = "/var/log/notemerge"

[web]
listen = "127.0.0.1:3000"
# Name of the environment variable holding the login password.
# Leave unset to trust the X-User-Id header (development only).
# admin_password_env = "NOTEMERGE_ADMIN_PASSWORD"
session_ttl_hours = 24
max_body_bytes = 2097152

[merge]
source_label = "source"
base_label = "base"
target_label = "target"
"#;

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
