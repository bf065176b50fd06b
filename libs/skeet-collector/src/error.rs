use std::path::PathBuf;

use crate::collector::CollectorState;

/// Errors produced by a feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connect to {url}: {detail}")]
    Connect { url: String, detail: String },

    #[error("read: {0}")]
    Read(String),

    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors produced while writing or reading artifacts.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("refusing to write an empty batch")]
    EmptyBatch,

    #[error("create dir {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("create {}: {source}", path.display())]
    Create { path: PathBuf, source: std::io::Error },

    #[error("write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },

    #[error("finish {}: {source}", path.display())]
    Finish { path: PathBuf, source: std::io::Error },

    #[error("open {}: {source}", path.display())]
    Open { path: PathBuf, source: std::io::Error },

    #[error("read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("decode {} line {line}: {source}", path.display())]
    Decode { path: PathBuf, line: usize, source: serde_json::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("operation requires state {expected:?}, collector is {actual:?}")]
    InvalidState { expected: CollectorState, actual: CollectorState },

    #[error("{0}")]
    Connect(FeedError),

    #[error("gave up reconnecting after {attempts} attempts: {last}")]
    ReconnectExhausted { attempts: u32, last: FeedError },

    #[error("sink: {0}")]
    Sink(#[from] SinkError),

    #[error("writer task: {0}")]
    WriterTask(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read '{path}': {source}")]
    Read { path: String, source: std::io::Error },

    #[error("parse '{path}': {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("invalid config: {0}")]
    Invalid(String),
}
