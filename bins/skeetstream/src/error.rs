use skeet_collector::{CollectorError, ConfigError, SinkError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Collector(#[from] CollectorError),

    #[error("artifact: {0}")]
    Artifact(#[from] SinkError),

    #[error("signal: {0}")]
    Signal(std::io::Error),

    #[error("output: {0}")]
    Output(std::io::Error),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}
