//! Configuration module for WeedSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::ClientId;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for WeedSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub filer: FilerConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub delta: DeltaConfig,
    pub workspace: WorkspaceConfig,
    pub logging: LoggingConfig,
}

/// Remote filer connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilerConfig {
    /// Base URL of the filer HTTP API.
    pub url: String,
    /// Account name; the user's files live under `/{username}/`.
    pub username: String,
    /// `host:port` of the transfer control channel.
    pub transfer_control_addr: String,
    /// `host:port` of the transfer data channel.
    pub transfer_data_addr: String,
    /// Control-channel dialect: `legacy` (bare strings) or `tagged` (JSON envelopes).
    pub dialect: String,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local base directory mapped onto the user's remote root.
    pub root: PathBuf,
    /// Whether folder syncs descend into subdirectories.
    pub recursive: bool,
    /// Size of the worker pool for one-sided transfers.
    pub workers: u32,
    /// Chunk size (bytes) the store uses when splitting objects.
    pub chunk_size: u64,
    /// Identity written into file locks; generated once and saved when unset.
    pub client_id: Option<String>,
}

/// Conflict retry schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Seconds to wait before the first retry round.
    pub interval_secs: u64,
    /// Multiplier applied to the wait after each round.
    pub backoff_factor: f64,
    /// Upper bound on the wait between rounds.
    pub max_interval_secs: u64,
    /// Number of retry rounds before giving up; 0 retries forever.
    pub max_rounds: u32,
}

/// Delta engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Path (or name on `$PATH`) of the `rdiff` executable.
    pub rdiff_path: PathBuf,
}

/// Scratch workspace settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Name prefix of scratch directories; stale ones with this prefix are purged.
    pub prefix: String,
    /// Directory holding scratch directories; the system temp dir when unset.
    pub root: Option<PathBuf>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/weedsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("weedsync")
            .join("config.yaml")
    }

    /// Platform-appropriate default path of the saved client id.
    ///
    /// Typically `$XDG_DATA_HOME/weedsync/client_id` on Linux.
    pub fn default_client_id_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("weedsync")
            .join("client_id")
    }

    /// The lock identity, saved at [`Config::default_client_id_path`] when
    /// not configured.
    pub fn client_id(&self) -> anyhow::Result<ClientId> {
        self.client_id_saved_at(&Self::default_client_id_path())
    }

    /// The configured lock identity, or the one saved in `state_file`.
    ///
    /// A fresh UUID is generated and written to `state_file` the first
    /// time, so locks taken by an interrupted run still belong to the next
    /// one.
    pub fn client_id_saved_at(&self, state_file: &Path) -> anyhow::Result<ClientId> {
        if let Some(id) = &self.sync.client_id {
            return Ok(ClientId::new(id.clone())?);
        }

        match std::fs::read_to_string(state_file) {
            Ok(saved) => {
                return ClientId::new(saved.trim().to_string()).with_context(|| {
                    format!("Invalid client id in {}", state_file.display())
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", state_file.display()));
            }
        }

        let id = ClientId::generate();
        if let Some(parent) = state_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(state_file, format!("{id}\n"))
            .with_context(|| format!("Failed to save client id to {}", state_file.display()))?;
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for FilerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8888".to_string(),
            username: std::env::var("USER")
                .ok()
                .filter(|user| !user.is_empty() && !user.contains('/'))
                .unwrap_or_else(|| "weedsync".to_string()),
            transfer_control_addr: "localhost:8889".to_string(),
            transfer_data_addr: "localhost:8890".to_string(),
            dialect: "legacy".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("SeaweedSync"),
            recursive: true,
            workers: 10,
            chunk_size: 1_048_576,
            client_id: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            backoff_factor: 2.0,
            max_interval_secs: 900,
            max_rounds: 10,
        }
    }
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            rdiff_path: PathBuf::from("rdiff"),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            prefix: "Seaweed_Cloud_Storage_".to_string(),
            root: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `filer.dialect`.
const VALID_DIALECTS: &[&str] = &["legacy", "tagged"];

/// Upper bound for `sync.workers`.
const MAX_WORKERS: u32 = 256;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- filer ---
        if !(self.filer.url.starts_with("http://") || self.filer.url.starts_with("https://")) {
            push(
                "filer.url",
                format!("must be an http(s) URL: {}", self.filer.url),
            );
        }
        if self.filer.username.is_empty() || self.filer.username.contains('/') {
            push(
                "filer.username",
                "must be non-empty and must not contain '/'".into(),
            );
        }
        if self.filer.transfer_control_addr.is_empty() {
            push("filer.transfer_control_addr", "must not be empty".into());
        }
        if self.filer.transfer_data_addr.is_empty() {
            push("filer.transfer_data_addr", "must not be empty".into());
        }
        if !VALID_DIALECTS.contains(&self.filer.dialect.as_str()) {
            push(
                "filer.dialect",
                format!(
                    "invalid dialect '{}'; valid options: {}",
                    self.filer.dialect,
                    VALID_DIALECTS.join(", ")
                ),
            );
        }

        // --- sync ---
        // Check sync root only when it does not start with `~` (tilde is expanded at runtime).
        let root_str = self.sync.root.to_string_lossy();
        if !root_str.starts_with('~') && !self.sync.root.exists() {
            push(
                "sync.root",
                format!("directory does not exist: {}", self.sync.root.display()),
            );
        }
        if self.sync.workers == 0 || self.sync.workers > MAX_WORKERS {
            push("sync.workers", format!("must be in range 1..={MAX_WORKERS}"));
        }
        if self.sync.chunk_size == 0 {
            push("sync.chunk_size", "must be greater than 0".into());
        }
        if let Some(id) = &self.sync.client_id {
            if let Err(err) = ClientId::new(id.clone()) {
                push("sync.client_id", err.to_string());
            }
        }

        // --- retry ---
        if self.retry.interval_secs == 0 {
            push("retry.interval_secs", "must be greater than 0".into());
        }
        if !(self.retry.backoff_factor >= 1.0) {
            push("retry.backoff_factor", "must be at least 1.0".into());
        }
        if self.retry.max_interval_secs < self.retry.interval_secs {
            push(
                "retry.max_interval_secs",
                format!(
                    "max_interval_secs ({}) must not be below interval_secs ({})",
                    self.retry.max_interval_secs, self.retry.interval_secs
                ),
            );
        }

        // --- delta ---
        if self.delta.rdiff_path.as_os_str().is_empty() {
            push("delta.rdiff_path", "must not be empty".into());
        }

        // --- workspace ---
        if self.workspace.prefix.is_empty() || self.workspace.prefix.contains('/') {
            push(
                "workspace.prefix",
                "must be non-empty and must not contain '/'".into(),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use weedsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .filer_url("http://filer.local:8888")
///     .filer_username("alice")
///     .sync_root(PathBuf::from("/home/alice/Sync"))
///     .retry_interval_secs(30)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- filer ---

    pub fn filer_url(mut self, url: impl Into<String>) -> Self {
        self.config.filer.url = url.into();
        self
    }

    pub fn filer_username(mut self, username: impl Into<String>) -> Self {
        self.config.filer.username = username.into();
        self
    }

    pub fn filer_transfer_addrs(
        mut self,
        control: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        self.config.filer.transfer_control_addr = control.into();
        self.config.filer.transfer_data_addr = data.into();
        self
    }

    pub fn filer_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.config.filer.dialect = dialect.into();
        self
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_recursive(mut self, recursive: bool) -> Self {
        self.config.sync.recursive = recursive;
        self
    }

    pub fn sync_workers(mut self, workers: u32) -> Self {
        self.config.sync.workers = workers;
        self
    }

    pub fn sync_chunk_size(mut self, bytes: u64) -> Self {
        self.config.sync.chunk_size = bytes;
        self
    }

    pub fn sync_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.sync.client_id = Some(id.into());
        self
    }

    // --- retry ---

    pub fn retry_interval_secs(mut self, seconds: u64) -> Self {
        self.config.retry.interval_secs = seconds;
        self
    }

    pub fn retry_backoff_factor(mut self, factor: f64) -> Self {
        self.config.retry.backoff_factor = factor;
        self
    }

    pub fn retry_max_interval_secs(mut self, seconds: u64) -> Self {
        self.config.retry.max_interval_secs = seconds;
        self
    }

    pub fn retry_max_rounds(mut self, rounds: u32) -> Self {
        self.config.retry.max_rounds = rounds;
        self
    }

    // --- delta / workspace / logging ---

    pub fn delta_rdiff_path(mut self, path: PathBuf) -> Self {
        self.config.delta.rdiff_path = path;
        self
    }

    pub fn workspace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.workspace.prefix = prefix.into();
        self
    }

    pub fn workspace_root(mut self, root: PathBuf) -> Self {
        self.config.workspace.root = Some(root);
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
