mod websocket;

use std::future::Future;
use std::pin::Pin;

use crate::error::FeedError;
use crate::record::Record;

pub use websocket::{WebSocketConnector, WebSocketFeed};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ═══════════════════════════════════════════════════════════════
//  Endpoint
// ═══════════════════════════════════════════════════════════════

/// Scheme/host/path triple of the remote feed. No query, no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl Endpoint {
    pub fn url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("{}://{}/{}", self.scheme, self.host, path)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Traits
// ═══════════════════════════════════════════════════════════════

/// One open connection yielding decoded records.
///
/// The sequence is lazy and ends only when the connection does: after
/// `next_record` returns `None` it keeps returning `None`, and a new
/// connection must be made through the [`Connector`].
pub trait FeedReader: Send {
    /// `Some(Err(FeedError::Decode))` affects only that message; the
    /// connection stays open and the next call reads the next message.
    fn next_record(&mut self) -> BoxFuture<'_, Option<Result<Record, FeedError>>>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self) -> BoxFuture<'_, Result<(), FeedError>>;
}

/// Factory for feed connections, used at startup and on reconnect.
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn FeedReader>, FeedError>>;

    /// Human-readable target for logs.
    fn target(&self) -> String;
}

/// Decode one raw message frame into a record.
pub fn decode_message(raw: &[u8]) -> Result<Record, FeedError> {
    Ok(Record::decode(raw)?)
}
