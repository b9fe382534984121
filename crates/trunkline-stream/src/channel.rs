//! Logical channels: independent subscriptions multiplexed by id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::debug;

use trunkline_core::{ChannelEnvelope, EventKey, Frame, ListenerToken, Router, StreamError};

use crate::stream::StreamInner;

pub(crate) struct ChannelInner {
    id: u64,
    stream: Arc<StreamInner>,
    router: Router<ChannelEnvelope>,
    closed: AtomicBool,
}

impl ChannelInner {
    pub(crate) fn new(id: u64, stream: Arc<StreamInner>) -> Self {
        Self {
            id,
            stream,
            router: Router::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Re-emit one envelope to this channel's listeners. The stream has
    /// already matched the id.
    pub(crate) fn deliver(&self, envelope: &ChannelEnvelope) {
        if self.is_closed() {
            return;
        }
        if self.stream.config().wildcard_event_enabled {
            self.router.emit(&EventKey::Any, envelope);
        }
        self.router.emit(&EventKey::typed(envelope.ty.as_str()), envelope);
    }

    /// Mark closed and drop every listener. Idempotent.
    pub(crate) fn detach(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.router.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// One logical subscription on a stream, addressed by its allocated id.
///
/// Created only by [`crate::Stream::open_channel`]. Clones share the same
/// underlying channel. Once closed, explicitly or because the owning stream
/// closed, every operation fails with [`StreamError::NotConnected`].
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn from_inner(inner: Arc<ChannelInner>) -> Self {
        Self { inner }
    }

    /// The id allocated when this channel was opened.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Send one channel-scoped event, wrapped as
    /// `{type:"channel", body:{id, type, body}}` through the owning stream.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] if this channel or its stream is closed;
    /// [`StreamError::Send`] when the transport write fails.
    pub async fn send(&self, ty: &str, body: Value) -> Result<(), StreamError> {
        if self.inner.is_closed() {
            return Err(StreamError::NotConnected);
        }
        self.inner
            .stream
            .send_frame(&Frame::channel(self.inner.id, ty, body))
            .await
    }

    /// Close this channel: send `{type:"disconnect", body:{id}}`, then detach
    /// the listeners and deregister the id immediately, regardless of the
    /// send outcome. Frames for this id are never delivered locally again.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] if already closed; otherwise the error
    /// of the disconnect send, if any.
    pub async fn close(&self) -> Result<(), StreamError> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Err(StreamError::NotConnected);
        }
        let result = self
            .inner
            .stream
            .send_frame(&Frame::disconnect(self.inner.id))
            .await;
        self.inner.detach();
        self.inner.stream.remove_channel(self.inner.id);
        debug!(id = self.inner.id, "channel closed");
        result
    }

    // ─── Listeners ───────────────────────────────────────────────────────

    /// Register a listener for one channel-scoped event type. The handler
    /// receives the inner event body.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] if this channel is closed.
    pub fn on(
        &self,
        ty: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<ListenerToken, StreamError> {
        if self.inner.is_closed() {
            return Err(StreamError::NotConnected);
        }
        Ok(self
            .inner
            .router
            .on(EventKey::typed(ty), move |envelope: &ChannelEnvelope| {
                handler(&envelope.body);
            }))
    }

    /// Like [`Channel::on`], deregistered after the first invocation.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] if this channel is closed.
    pub fn once(
        &self,
        ty: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<ListenerToken, StreamError> {
        if self.inner.is_closed() {
            return Err(StreamError::NotConnected);
        }
        Ok(self
            .inner
            .router
            .once(EventKey::typed(ty), move |envelope: &ChannelEnvelope| {
                handler(&envelope.body);
            }))
    }

    /// Remove one typed listener. Returns whether it was still registered.
    pub fn off(&self, ty: &str, token: ListenerToken) -> bool {
        self.inner.router.off(&EventKey::typed(ty), token)
    }

    /// Remove every listener for one event type.
    pub fn off_all(&self, ty: &str) {
        self.inner.router.off_all(&EventKey::typed(ty));
    }

    /// Register a wildcard listener receiving every event on this channel as
    /// its inner type/body envelope.
    ///
    /// Fires only while `wildcard_event_enabled` is set in the config.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] if this channel is closed.
    pub fn on_any(
        &self,
        handler: impl Fn(&ChannelEnvelope) + Send + Sync + 'static,
    ) -> Result<ListenerToken, StreamError> {
        if self.inner.is_closed() {
            return Err(StreamError::NotConnected);
        }
        Ok(self.inner.router.on(EventKey::Any, handler))
    }

    /// Remove one wildcard listener.
    pub fn off_any(&self, token: ListenerToken) -> bool {
        self.inner.router.off(&EventKey::Any, token)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
