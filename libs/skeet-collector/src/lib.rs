//! Long-running collector for a WebSocket event feed.
//!
//! Records are read one message at a time, held in a count-bounded
//! [`Buffer`], and written in batches to gzip-compressed JSON Lines
//! artifacts by a [`RecordSink`]. The [`Collector`] ties the pieces together
//! and owns the connection lifecycle.

pub mod buffer;
pub mod collector;
pub mod config;
pub mod error;
pub mod feed;
pub mod record;
pub mod retry;
pub mod sink;

pub use buffer::{Buffer, DEFAULT_PURGE_AFTER};
pub use collector::{Collector, CollectorState, CollectorStats};
pub use config::{CollectorConfig, ShutdownPolicy};
pub use error::{CollectorError, ConfigError, FeedError, SinkError};
pub use feed::{BoxFuture, Connector, Endpoint, FeedReader, WebSocketConnector, decode_message};
pub use record::Record;
pub use retry::RetryPolicy;
pub use sink::{Artifact, GzipJsonlSink, RecordSink, read_artifact};
