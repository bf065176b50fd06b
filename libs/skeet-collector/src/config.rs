use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::buffer::DEFAULT_PURGE_AFTER;
use crate::error::ConfigError;
use crate::feed::Endpoint;
use crate::retry::RetryPolicy;

pub const DEFAULT_SCHEME: &str = "wss";
pub const DEFAULT_JETSTREAM_HOST: &str = "jetstream2.us-east.bsky.network";
pub const SUBSCRIBE_PATH: &str = "/subscribe";
pub const DEFAULT_DATA_DIR: &str = "data/";

// ═══════════════════════════════════════════════════════════════
//  Root config
// ═══════════════════════════════════════════════════════════════

/// Root configuration. Every field has a default, so an empty TOML
/// document (or no file at all) yields a working collector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl CollectorConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Like [`load`](Self::load), but a missing file means defaults.
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(path: &str, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.host.trim().is_empty() {
            return Err(ConfigError::Invalid("feed.host must not be empty".into()));
        }
        if self.buffer.purge_after == 0 {
            return Err(ConfigError::Invalid("buffer.purge_after must be at least 1".into()));
        }
        if self.buffer.flush_queue == 0 {
            return Err(ConfigError::Invalid("buffer.flush_queue must be at least 1".into()));
        }
        if self.storage.compression_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "storage.compression_level must be 0-9, got {}",
                self.storage.compression_level
            )));
        }
        if self.retry.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_consecutive_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            scheme: self.feed.scheme.clone(),
            host: self.feed.host.clone(),
            path: self.feed.path.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            max_consecutive_failures: self.retry.max_consecutive_failures,
            max_reconnect_attempts: self.retry.max_reconnect_attempts,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sections
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.into()
}
fn default_host() -> String {
    DEFAULT_JETSTREAM_HOST.into()
}
fn default_path() -> String {
    SUBSCRIBE_PATH.into()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            path: default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Record count that triggers a flush.
    #[serde(default = "default_purge_after")]
    pub purge_after: usize,
    /// Drained batches allowed to wait for the writer before reads block.
    #[serde(default = "default_flush_queue")]
    pub flush_queue: usize,
}

fn default_purge_after() -> usize {
    DEFAULT_PURGE_AFTER
}
fn default_flush_queue() -> usize {
    4
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            purge_after: default_purge_after(),
            flush_queue: default_flush_queue(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// gzip level, 0-9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}
fn default_compression_level() -> u32 {
    9
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            compression_level: default_compression_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_max_consecutive_failures() -> u32 {
    10
}
fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// What happens to records still buffered when the collector stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Write the partial buffer as a final artifact.
    #[default]
    Flush,
    /// Drop the partial buffer.
    Discard,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    #[serde(default)]
    pub policy: ShutdownPolicy,
    /// How long to wait for queued batches to be written.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_grace_ms() -> u64 {
    15_000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            policy: ShutdownPolicy::default(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
