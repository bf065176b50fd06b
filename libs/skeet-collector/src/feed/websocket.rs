use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{BoxFuture, Connector, Endpoint, FeedReader, decode_message};
use crate::error::FeedError;
use crate::record::Record;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ═══════════════════════════════════════════════════════════════
//  WebSocketConnector
// ═══════════════════════════════════════════════════════════════

pub struct WebSocketConnector {
    endpoint: Endpoint,
}

impl WebSocketConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn FeedReader>, FeedError>> {
        let url = self.endpoint.url();
        Box::pin(async move {
            let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| FeedError::Connect {
                    url: url.clone(),
                    detail: e.to_string(),
                })?;
            tracing::info!(%url, status = %response.status(), "websocket connected");
            Ok(Box::new(WebSocketFeed::new(url, stream)) as Box<dyn FeedReader>)
        })
    }

    fn target(&self) -> String {
        self.endpoint.url()
    }
}

// ═══════════════════════════════════════════════════════════════
//  WebSocketFeed
// ═══════════════════════════════════════════════════════════════

pub struct WebSocketFeed {
    url: String,
    stream: WsStream,
    /// Set once the connection can no longer yield messages.
    terminated: bool,
    closed: bool,
}

impl WebSocketFeed {
    fn new(url: String, stream: WsStream) -> Self {
        Self {
            url,
            stream,
            terminated: false,
            closed: false,
        }
    }

    async fn read_next(&mut self) -> Option<Result<Record, FeedError>> {
        if self.terminated {
            return None;
        }
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    // Only an oversized frame leaves the stream usable.
                    if !matches!(e, WsError::Capacity(_)) {
                        self.terminated = true;
                    }
                    return Some(Err(FeedError::Read(e.to_string())));
                }
                None => {
                    tracing::info!(url = %self.url, "websocket stream ended");
                    self.terminated = true;
                    return None;
                }
            };

            match message {
                Message::Text(text) => return Some(decode_message(text.as_str().as_bytes())),
                Message::Binary(data) => return Some(decode_message(&data)),
                Message::Close(frame) => {
                    tracing::info!(url = %self.url, frame = ?frame, "websocket closed by peer");
                    self.terminated = true;
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

impl FeedReader for WebSocketFeed {
    fn next_record(&mut self) -> BoxFuture<'_, Option<Result<Record, FeedError>>> {
        Box::pin(self.read_next())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), FeedError>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            let peer_gone = std::mem::replace(&mut self.terminated, true);
            match self.stream.close(None).await {
                Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                    tracing::info!(url = %self.url, "websocket closed");
                    Ok(())
                }
                Err(e) if peer_gone => {
                    tracing::debug!(url = %self.url, error = %e, "close after peer hangup");
                    Ok(())
                }
                Err(e) => Err(FeedError::Read(e.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `messages` to the first client, then closes.
    async fn serve_once(messages: Vec<Message>) -> (Endpoint, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for message in messages {
                ws.send(message).await.unwrap();
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        });
        let endpoint = Endpoint {
            scheme: "ws".into(),
            host: addr.to_string(),
            path: "/subscribe".into(),
        };
        (endpoint, handle)
    }

    #[tokio::test]
    async fn reads_decodes_and_skips_control_frames() {
        let (endpoint, server) = serve_once(vec![
            Message::text(r#"{"kind":"commit","seq":1}"#),
            Message::Ping(Vec::new().into()),
            Message::text("{broken"),
            Message::binary(br#"{"kind":"identity","seq":2}"#.to_vec()),
        ])
        .await;

        let connector = WebSocketConnector::new(endpoint);
        let mut feed = connector.connect().await.unwrap();

        let first = feed.next_record().await.unwrap().unwrap();
        assert_eq!(first.value(), &json!({"kind": "commit", "seq": 1}));

        let bad = feed.next_record().await.unwrap();
        assert!(matches!(bad, Err(FeedError::Decode(_))));

        let second = feed.next_record().await.unwrap().unwrap();
        assert_eq!(second.value(), &json!({"kind": "identity", "seq": 2}));

        assert!(feed.next_record().await.is_none());
        assert!(feed.next_record().await.is_none());

        feed.close().await.unwrap();
        feed.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::new(Endpoint {
            scheme: "ws".into(),
            host: addr.to_string(),
            path: "/subscribe".into(),
        });
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, FeedError::Connect { .. }));
        assert!(connector.target().starts_with("ws://127.0.0.1:"));
    }
}
