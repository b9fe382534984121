//! The stream multiplexer: one connection actor, many logical channels.
//!
//! A [`Stream`] exclusively owns both transport halves through a spawned
//! actor task. Commands (sends, close requests) and inbound wire events are
//! multiplexed on one `tokio::select!` loop, so writes are serialized and
//! every inbound message is dispatched to completion before the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trunkline_core::{
    ChannelEnvelope, ClientConfig, EventKey, Frame, ListenerToken, Router, StreamError,
    TYPE_CHANNEL,
};

use crate::channel::{Channel, ChannelInner};
use crate::feed::{PostFeed, PostUpdate, TYPE_POST_UPDATED};
use crate::transport::{
    Transport, TransportEvent, TransportReader, TransportWriter, WsTransport, build_stream_url,
};

/// Connection lifecycle. Transitions are strictly forward; a server-initiated
/// close may skip `Closing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Connected; send and receive permitted.
    Open,
    /// Local close requested, awaiting confirmation from the transport.
    Closing,
    /// Terminal. Channels are detached and every operation fails.
    Closed,
}

/// Command processed by the connection actor.
enum ConnCommand {
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), StreamError>>,
    },
    Close,
}

pub(crate) struct StreamInner {
    config: ClientConfig,
    state: Mutex<StreamState>,
    router: Router<Frame>,
    errors: Router<String>,
    channels: Mutex<HashMap<u64, Arc<ChannelInner>>>,
    next_channel_id: AtomicU64,
    feed: Router<PostUpdate>,
    cmd_tx: mpsc::Sender<ConnCommand>,
    closed: Notify,
}

impl StreamInner {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn feed_router(&self) -> &Router<PostUpdate> {
        &self.feed
    }

    fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Serialize and write one frame through the connection actor.
    ///
    /// Resolves once the transport acknowledges the write, not on any server
    /// response.
    pub(crate) async fn send_frame(&self, frame: &Frame) -> Result<(), StreamError> {
        if self.state() != StreamState::Open {
            return Err(StreamError::NotConnected);
        }
        let text = serde_json::to_string(frame).map_err(|e| StreamError::send(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCommand::Send {
                text,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StreamError::NotConnected)?;
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(StreamError::NotConnected),
        }
    }

    pub(crate) fn remove_channel(&self, id: u64) {
        let _ = self.channels.lock().remove(&id);
    }

    /// Route one raw inbound message. Runs on the actor task, one message at
    /// a time, handlers invoked synchronously.
    fn dispatch(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping malformed inbound frame");
                if self.config.debug_log_enabled {
                    debug!(raw = text, "malformed frame payload");
                }
                return;
            }
        };
        if self.config.debug_log_enabled {
            debug!(ty = %frame.ty, body = %frame.body, "inbound frame");
        }

        if self.config.wildcard_event_enabled {
            self.router.emit(&EventKey::Any, &frame);
        }
        self.router.emit(&EventKey::typed(frame.ty.as_str()), &frame);

        if frame.ty == TYPE_CHANNEL {
            self.route_to_channel(&frame);
        } else if frame.ty == TYPE_POST_UPDATED {
            self.route_to_feed(&frame);
        }
    }

    fn route_to_channel(&self, frame: &Frame) {
        let Some(envelope) = ChannelEnvelope::from_body(&frame.body) else {
            warn!("channel frame with undecodable envelope, dropping");
            return;
        };
        let target = {
            let channels = self.channels.lock();
            channels.get(&envelope.id).map(Arc::clone)
        };
        match target {
            Some(channel) => channel.deliver(&envelope),
            None => debug!(id = envelope.id, "frame for unregistered channel, dropping"),
        }
    }

    fn route_to_feed(&self, frame: &Frame) {
        let Some(update) = PostUpdate::from_body(&frame.body) else {
            warn!("post update with undecodable body, dropping");
            return;
        };
        if self.config.wildcard_event_enabled {
            self.feed.emit(&EventKey::Any, &update);
        }
        self.feed.emit(&EventKey::typed(update.ty.as_str()), &update);
    }

    /// Terminal transition. Detaches every channel, clears the feed, and
    /// wakes disconnect waiters. Idempotent.
    fn mark_closed(&self) {
        {
            let mut state = self.state.lock();
            if *state == StreamState::Closed {
                return;
            }
            *state = StreamState::Closed;
        }
        let channels: Vec<Arc<ChannelInner>> = {
            let mut map = self.channels.lock();
            map.drain().map(|(_, channel)| channel).collect()
        };
        for channel in &channels {
            channel.detach();
        }
        self.feed.clear();
        self.closed.notify_waiters();
        info!("stream closed");
    }
}

/// A multiplexed streaming connection.
///
/// Created by [`Stream::connect`]; dropped handles request a best-effort
/// close if the stream is still open.
pub struct Stream {
    inner: Arc<StreamInner>,
    _actor: JoinHandle<()>,
}

impl Stream {
    /// Connect to `{host}/streaming` through the given transport.
    ///
    /// The access token, when present, is carried as the `i` query parameter.
    ///
    /// # Errors
    ///
    /// [`StreamError::Connect`] if the transport fails to establish.
    pub async fn connect(
        host: &str,
        secure: bool,
        token: Option<&str>,
        config: ClientConfig,
        transport: &dyn Transport,
    ) -> Result<Self, StreamError> {
        let url = build_stream_url(host, secure, token);
        let (writer, reader) = transport.connect(&url).await?;
        info!(host, secure, "stream connected");
        Ok(Self::from_parts(writer, reader, config))
    }

    /// [`Stream::connect`] over the production WebSocket transport.
    ///
    /// # Errors
    ///
    /// [`StreamError::Connect`] if the connection fails to establish.
    pub async fn connect_ws(
        host: &str,
        secure: bool,
        token: Option<&str>,
        config: ClientConfig,
    ) -> Result<Self, StreamError> {
        Self::connect(host, secure, token, config, &WsTransport).await
    }

    fn from_parts(
        writer: Box<dyn TransportWriter>,
        reader: Box<dyn TransportReader>,
        config: ClientConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let inner = Arc::new(StreamInner {
            config,
            state: Mutex::new(StreamState::Open),
            router: Router::new(),
            errors: Router::new(),
            channels: Mutex::new(HashMap::new()),
            next_channel_id: AtomicU64::new(1),
            feed: Router::new(),
            cmd_tx,
            closed: Notify::new(),
        });
        let actor = tokio::spawn(connection_loop(Arc::clone(&inner), writer, reader, cmd_rx));
        Self {
            inner,
            _actor: actor,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    /// The configuration this stream was constructed with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    // ─── Outbound ────────────────────────────────────────────────────────

    /// Send one `{type, body}` frame.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] unless the stream is open;
    /// [`StreamError::Send`] when the transport write fails.
    pub async fn send(&self, ty: &str, body: Value) -> Result<(), StreamError> {
        self.inner.send_frame(&Frame::event(ty, body)).await
    }

    /// Open a logical channel on this connection.
    ///
    /// Allocates the next id (monotonic, starting at 1, never reused),
    /// registers the channel so frames arriving right after the send cannot
    /// be missed, then sends the connect frame. Returns as soon as the local
    /// write succeeds; no server acknowledgment is awaited.
    ///
    /// # Errors
    ///
    /// Fails like [`Stream::send`]; on failure the registration is rolled
    /// back and the id stays consumed.
    pub async fn open_channel(
        &self,
        channel: &str,
        params: Option<Value>,
    ) -> Result<Channel, StreamError> {
        if self.inner.state() != StreamState::Open {
            return Err(StreamError::NotConnected);
        }
        let id = self.inner.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let chan = Arc::new(ChannelInner::new(id, Arc::clone(&self.inner)));
        let _ = self.inner.channels.lock().insert(id, Arc::clone(&chan));

        let frame = Frame::connect(channel, id, params);
        if let Err(err) = self.inner.send_frame(&frame).await {
            self.inner.remove_channel(id);
            return Err(err);
        }
        debug!(id, channel, "channel opened");
        Ok(Channel::from_inner(chan))
    }

    /// Gracefully close the connection.
    ///
    /// Moves the state to `Closing`, requests transport close, and suspends
    /// until the close is confirmed or `config.disconnect_timeout_ms`
    /// elapses. Never retried internally.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] unless the stream is open;
    /// [`StreamError::DisconnectTimeout`] when the deadline expires first.
    pub async fn disconnect(&self) -> Result<(), StreamError> {
        {
            let mut state = self.inner.state.lock();
            if *state != StreamState::Open {
                return Err(StreamError::NotConnected);
            }
            *state = StreamState::Closing;
        }
        info!("stream close requested");

        // Arm the waiter before requesting close so the wakeup cannot be
        // missed, then re-check state for a close that already completed.
        let notified = self.inner.closed.notified();
        tokio::pin!(notified);
        let _ = notified.as_mut().enable();

        let _ = self.inner.cmd_tx.send(ConnCommand::Close).await;
        if self.inner.state() == StreamState::Closed {
            return Ok(());
        }

        let deadline = self.inner.config.disconnect_timeout();
        match tokio::time::timeout(deadline, notified).await {
            Ok(()) => Ok(()),
            Err(_) => Err(StreamError::DisconnectTimeout {
                waited_ms: self.inner.config.disconnect_timeout_ms,
            }),
        }
    }

    // ─── Listeners ───────────────────────────────────────────────────────

    /// Register a listener for frames of one event type. The handler
    /// receives the frame body.
    pub fn on(&self, ty: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> ListenerToken {
        self.inner
            .router
            .on(EventKey::typed(ty), move |frame: &Frame| handler(&frame.body))
    }

    /// Like [`Stream::on`], deregistered after the first invocation.
    pub fn once(
        &self,
        ty: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.inner
            .router
            .once(EventKey::typed(ty), move |frame: &Frame| handler(&frame.body))
    }

    /// Remove one typed listener. Returns whether it was still registered.
    pub fn off(&self, ty: &str, token: ListenerToken) -> bool {
        self.inner.router.off(&EventKey::typed(ty), token)
    }

    /// Remove every listener for one event type.
    pub fn off_all(&self, ty: &str) {
        self.inner.router.off_all(&EventKey::typed(ty));
    }

    /// Register a wildcard listener receiving every inbound frame whole.
    ///
    /// Fires only while `wildcard_event_enabled` is set in the config.
    pub fn on_any(&self, handler: impl Fn(&Frame) + Send + Sync + 'static) -> ListenerToken {
        self.inner.router.on(EventKey::Any, handler)
    }

    /// Remove one wildcard listener.
    pub fn off_any(&self, token: ListenerToken) -> bool {
        self.inner.router.off(&EventKey::Any, token)
    }

    /// Register a listener for transport-level errors.
    ///
    /// Errors are also logged; they do not by themselves close the stream.
    pub fn on_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) -> ListenerToken {
        self.inner
            .errors
            .on(EventKey::Any, move |message: &String| handler(message))
    }

    /// Remove one error listener.
    pub fn off_error(&self, token: ListenerToken) -> bool {
        self.inner.errors.off(&EventKey::Any, token)
    }

    /// Handle to the post-update feed riding this connection.
    #[must_use]
    pub fn post_feed(&self) -> PostFeed {
        PostFeed::from_inner(Arc::clone(&self.inner))
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Best effort: ask the actor to close the transport if the handle is
        // dropped while still open.
        if self.inner.state() == StreamState::Open {
            let _ = self.inner.cmd_tx.try_send(ConnCommand::Close);
        }
    }
}

/// Connection actor. Owns both transport halves; ends when the reader
/// reports closed.
async fn connection_loop(
    inner: Arc<StreamInner>,
    mut writer: Box<dyn TransportWriter>,
    mut reader: Box<dyn TransportReader>,
    mut cmd_rx: mpsc::Receiver<ConnCommand>,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    ConnCommand::Send { text, reply } => {
                        let result = writer.send(text).await;
                        let _ = reply.send(result);
                    }
                    ConnCommand::Close => {
                        if let Err(err) = writer.close().await {
                            warn!(error = %err, "transport close request failed");
                        }
                        // Keep reading; `Closed` from the reader ends the loop.
                    }
                }
            }
            event = reader.next_event() => {
                match event {
                    TransportEvent::Message(text) => inner.dispatch(&text),
                    TransportEvent::Error(message) => {
                        warn!(error = %message, "transport error");
                        inner.errors.emit(&EventKey::Any, &message);
                    }
                    TransportEvent::Closed => break,
                }
            }
        }
    }
    inner.mark_closed();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
