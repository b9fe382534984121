//! Connection adapter seam and its `tokio-tungstenite` implementation.
//!
//! The stream never touches a socket type directly; it talks to the two
//! halves returned by [`Transport::connect`]. Tests substitute a scripted
//! in-memory adapter behind the same traits.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use trunkline_core::StreamError;

/// One event observed on the reading half of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text message.
    Message(String),
    /// A transport-level error. Does not by itself end the connection.
    Error(String),
    /// The connection is closed. Terminal; repeats on every later read.
    Closed,
}

/// Writing half of an established connection.
#[async_trait]
pub trait TransportWriter: Send {
    /// Send one text message, resolving once the write is acknowledged.
    async fn send(&mut self, text: String) -> Result<(), StreamError>;

    /// Request connection close. Completion is observed on the reader as
    /// [`TransportEvent::Closed`].
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Reading half of an established connection.
#[async_trait]
pub trait TransportReader: Send {
    /// Wait for the next event from the wire.
    ///
    /// Implementations guarantee that [`TransportEvent::Closed`] eventually
    /// arrives after a close request or a dropped transport, and that every
    /// read after that returns `Closed` again.
    async fn next_event(&mut self) -> TransportEvent;
}

/// Connection factory consumed by [`crate::Stream::connect`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection to `url`, yielding the write and read halves.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>), StreamError>;
}

/// Build the streaming endpoint URL for a host.
///
/// `{wss|ws}://{host}/streaming`, with the access token carried as the `i`
/// query parameter when present.
#[must_use]
pub fn build_stream_url(host: &str, secure: bool, token: Option<&str>) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    match token {
        Some(token) => format!("{scheme}://{host}/streaming?i={}", urlencoded(token)),
        None => format!("{scheme}://{host}/streaming"),
    }
}

fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('=', "%3D")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace(':', "%3A")
        .replace('?', "%3F")
        .replace('#', "%23")
}

// ─── WebSocket implementation ────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production adapter over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>), StreamError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| StreamError::connect(e.to_string()))?;
        let (sink, source) = ws.split();
        Ok((
            Box::new(WsWriter { sink }),
            Box::new(WsReader {
                source: Some(source),
            }),
        ))
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamError::send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| StreamError::send(e.to_string()))
    }
}

struct WsReader {
    /// `None` once the connection has closed.
    source: Option<SplitStream<WsStream>>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            let Some(source) = self.source.as_mut() else {
                return TransportEvent::Closed;
            };
            match source.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Message(text.to_string()),
                // Only utf8 text frames carry protocol traffic; ping/pong is
                // answered by tungstenite and binary frames are skipped.
                Some(Ok(Message::Close(_))) | None => {
                    self.source = None;
                    return TransportEvent::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.source = None;
                    return TransportEvent::Error(e.to_string());
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
