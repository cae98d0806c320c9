//! Configuration loader and validator for the sync CLI and poller daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::{ClientOptions, READWISE_API_V2_BASE, READWISE_API_V3_BASE, TOKEN_ENV_VAR};
use crate::poller::PollerConfig;
use crate::sync::BatchSyncConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema. Every section may be
/// omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub readwise: Readwise,
    pub sync: SyncSettings,
    pub poller: PollerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
        }
    }
}

/// API access settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Readwise {
    pub token: String,
    pub v2_base: String,
    pub v3_base: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for Readwise {
    fn default() -> Self {
        Self {
            token: String::new(),
            v2_base: READWISE_API_V2_BASE.into(),
            v3_base: READWISE_API_V3_BASE.into(),
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl std::fmt::Debug for Readwise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readwise")
            .field("token", &"<redacted>")
            .field("v2_base", &self.v2_base)
            .field("v3_base", &self.v3_base)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Batch sync settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub continue_on_error: bool,
    pub state_file: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            continue_on_error: true,
            state_file: None,
        }
    }
}

/// Background poller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerSettings {
    pub poll_interval_seconds: u64,
    pub include_documents: bool,
    pub state_file: Option<PathBuf>,
    pub max_consecutive_errors: u32,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 300,
            include_documents: true,
            state_file: None,
            max_consecutive_errors: 5,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 3600,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Take the token from `READWISE_API_KEY` when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.readwise.token = token;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }

    pub fn client_options(&self) -> Result<ClientOptions, ConfigError> {
        let options = ClientOptions::new(self.readwise.token.clone())
            .with_base_urls(&self.readwise.v2_base, &self.readwise.v3_base)
            .map_err(|_| ConfigError::Invalid("readwise base URLs must be valid URLs"))?
            .with_timeout(Duration::from_secs(self.readwise.timeout_seconds))
            .with_max_retries(self.readwise.max_retries);
        Ok(options)
    }

    pub fn batch_sync_config(&self) -> BatchSyncConfig {
        BatchSyncConfig {
            batch_size: self.sync.batch_size,
            state_file: self.sync.state_file.clone(),
            continue_on_error: self.sync.continue_on_error,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(self.poller.poll_interval_seconds),
            include_documents: self.poller.include_documents,
            state_file: self.poller.state_file.clone(),
            max_consecutive_errors: self.poller.max_consecutive_errors,
            backoff_multiplier: self.poller.backoff_multiplier,
            max_backoff: Duration::from_secs(self.poller.max_backoff_seconds),
        }
    }
}

/// Parse a YAML file without validating it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn read(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Load configuration from a YAML file, apply the environment and validate.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = read(path)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.readwise.token.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "readwise.token must be non-empty (or set READWISE_API_KEY)",
        ));
    }
    if reqwest::Url::parse(&cfg.readwise.v2_base).is_err() {
        return Err(ConfigError::Invalid("readwise.v2_base must be a valid URL"));
    }
    if reqwest::Url::parse(&cfg.readwise.v3_base).is_err() {
        return Err(ConfigError::Invalid("readwise.v3_base must be a valid URL"));
    }

    if cfg.sync.batch_size == 0 {
        return Err(ConfigError::Invalid("sync.batch_size must be > 0"));
    }

    let p = &cfg.poller;
    if p.poll_interval_seconds == 0 {
        return Err(ConfigError::Invalid("poller.poll_interval_seconds must be > 0"));
    }
    if p.max_consecutive_errors == 0 {
        return Err(ConfigError::Invalid("poller.max_consecutive_errors must be > 0"));
    }
    if p.backoff_multiplier.is_nan() || p.backoff_multiplier < 1.0 {
        return Err(ConfigError::Invalid("poller.backoff_multiplier must be >= 1.0"));
    }
    if p.max_backoff_seconds < p.poll_interval_seconds {
        return Err(ConfigError::Invalid(
            "poller.max_backoff_seconds must be >= poller.poll_interval_seconds",
        ));
    }

    Ok(())
}

/// Documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

readwise:
  # READWISE_API_KEY overrides this value.
  token: "YOUR_READWISE_ACCESS_TOKEN"
  v2_base: "https://readwise.io/api/v2/"
  v3_base: "https://readwise.io/api/v3/"
  timeout_seconds: 30
  max_retries: 3

sync:
  batch_size: 100
  continue_on_error: true
  state_file: "./data/sync_state.json"

poller:
  poll_interval_seconds: 300
  include_documents: true
  state_file: "./data/poller_state.json"
  max_consecutive_errors: 5
  backoff_multiplier: 2.0
  max_backoff_seconds: 3600
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_config() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_config();
        validate(&cfg).unwrap();
        assert_eq!(cfg.sync.batch_size, 100);
        assert_eq!(cfg.poller.max_backoff_seconds, 3600);
        assert_eq!(
            cfg.sync.state_file.as_deref(),
            Some(Path::new("./data/sync_state.json"))
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: Config = serde_yaml::from_str("readwise:\n  token: abc\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.readwise.v2_base, READWISE_API_V2_BASE);
        assert_eq!(cfg.poller, PollerSettings::default());
        assert_eq!(cfg.app.data_dir, "./data");
    }

    #[test]
    fn invalid_token() {
        let mut cfg = example_config();
        cfg.readwise.token = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("readwise.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_numbers() {
        let mut cfg = example_config();
        cfg.sync.batch_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("batch_size")));

        let mut cfg = example_config();
        cfg.poller.poll_interval_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.poller.backoff_multiplier = 0.5;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("backoff_multiplier")));

        let mut cfg = example_config();
        cfg.poller.max_consecutive_errors = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.poller.max_backoff_seconds = 10;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("max_backoff")));
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg = example_config();
        cfg.readwise.v3_base = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("v3_base")));
    }

    #[test]
    fn converters_carry_values() {
        let cfg = example_config();
        let poller = cfg.poller_config();
        assert_eq!(poller.poll_interval, Duration::from_secs(300));
        assert_eq!(poller.max_backoff, Duration::from_secs(3600));
        assert_eq!(poller.state_file, Some(PathBuf::from("./data/poller_state.json")));

        let sync = cfg.batch_sync_config();
        assert_eq!(sync.batch_size, 100);
        assert!(sync.continue_on_error);

        let options = cfg.client_options().unwrap();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.v3_base.as_str(), "https://readwise.io/api/v3/");
        assert!(!format!("{:?}", cfg.readwise).contains("YOUR_READWISE"));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_config();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = read(Some(&p)).unwrap();
        assert_eq!(cfg.poller.backoff_multiplier, 2.0);
        assert!(matches!(read(Some(&td.path().join("missing.yaml"))), Err(ConfigError::Io(_))));
    }
}
