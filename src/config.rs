//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service under which credentials are stored.
pub const KEYRING_SERVICE: &str = "boxwatch";

/// Device monitor invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Monitor binary (e.g., `idf.py`).
    #[serde(default = "default_monitor_command")]
    pub command: String,
    /// Fixed arguments passed to the monitor binary.
    #[serde(default = "default_monitor_args")]
    pub args: Vec<String>,
    /// Working directory for the monitor; inherits ours when absent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Wall-clock deadline for one capture attempt.
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_seconds: u64,
    /// Longest single output line accepted from the monitor.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            command: default_monitor_command(),
            args: default_monitor_args(),
            working_dir: None,
            capture_timeout_seconds: default_capture_timeout(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

fn default_monitor_command() -> String {
    "idf.py".into()
}

fn default_monitor_args() -> Vec<String> {
    vec!["--project-dir".into(), "..".into(), "monitor".into()]
}

fn default_capture_timeout() -> u64 {
    15
}

fn default_max_line_bytes() -> usize {
    crate::capture::codec::MAX_LINE_BYTES
}

/// Change-detector settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DetectorConfig {
    /// Hamming distance that must be strictly exceeded to count as a change.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Side length of the hash grid; the fingerprint has `hash_size²` bits.
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            hash_size: default_hash_size(),
        }
    }
}

fn default_threshold() -> u32 {
    5
}

fn default_hash_size() -> u32 {
    8
}

/// Vision collaborator settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// API root, without the `/chat/completions` suffix.
    #[serde(default = "default_analysis_base_url")]
    pub base_url: String,
    /// Vision-capable model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Completion token ceiling.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Scene preamble placed at the top of the prompt.
    #[serde(default = "default_scene_context")]
    pub scene_context: String,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: default_analysis_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            request_timeout_seconds: default_request_timeout(),
            scene_context: default_scene_context(),
            api_key: String::new(),
        }
    }
}

fn default_analysis_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_max_tokens() -> u32 {
    700
}

fn default_request_timeout() -> u64 {
    60
}

fn default_scene_context() -> String {
    "The item is on the bottom of the box. The picture was taken from the upper left corner. \
     The box bottom size is 45 cm x 33 cm."
        .into()
}

/// Chat notification settings.
///
/// Without a `[notify]` table notifications are off ([`Default`]). Inside
/// the table `enabled` defaults to `true`, so writing the table opts in.
///
/// The bearer token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotifyConfig {
    /// Whether change notifications are posted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Chat server root (the `/api/v4/posts` path is appended).
    #[serde(default)]
    pub base_url: String,
    /// Channel that receives change notifications.
    #[serde(default)]
    pub channel_id: String,
    /// Bot token used for posting (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            channel_id: String::new(),
            token: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

fn default_history_path() -> PathBuf {
    PathBuf::from("db.json")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Fixed delay between the end of one iteration and the start of the next.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// History store location.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Monitor process settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Change-detector settings.
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Vision collaborator settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Chat notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the analysis API key and chat token from OS keychain with
    /// env-var fallback.
    ///
    /// The chat token is only required when notifications are enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required credential is found in
    /// neither the keychain nor the environment.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.analysis.api_key = load_credential("openai_api_key", "OPENAI_API_KEY").await?;
        if self.notify.enabled {
            self.notify.token = load_credential("mattermost_token", "MATTERMOST_TOKEN").await?;
        }
        Ok(())
    }

    /// Deadline for a single capture attempt.
    #[must_use]
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.capture_timeout_seconds)
    }

    /// Delay between orchestrator iterations.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Re-run validation after CLI overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.capture_timeout_seconds == 0 {
            return Err(AppError::Config(
                "monitor.capture_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.monitor.command.trim().is_empty() {
            return Err(AppError::Config("monitor.command must not be empty".into()));
        }

        if self.monitor.max_line_bytes == 0 {
            return Err(AppError::Config(
                "monitor.max_line_bytes must be greater than zero".into(),
            ));
        }

        if !(4..=16).contains(&self.detector.hash_size) {
            return Err(AppError::Config(format!(
                "detector.hash_size must be within 4..=16, got {}",
                self.detector.hash_size
            )));
        }

        if self.notify.enabled && (self.notify.channel_id.is_empty() || self.notify.base_url.is_empty()) {
            return Err(AppError::Config(
                "notify.base_url and notify.channel_id are required when notifications are enabled"
                    .into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
