//! Per-post update events riding the stream connection.
//!
//! The server pushes `postUpdated` frames for posts the client subscribed
//! to; the feed decodes them and re-emits by the inner update kind.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use trunkline_core::{EventKey, Frame, ListenerToken, StreamError};

use crate::stream::StreamInner;

pub(crate) const TYPE_POST_UPDATED: &str = "postUpdated";
const TYPE_SUB_POST: &str = "subPost";
const TYPE_UNSUB_POST: &str = "unsubPost";

/// One decoded post update: which post changed, what happened, the payload.
#[derive(Clone, Debug, Deserialize)]
pub struct PostUpdate {
    /// Id of the post that changed.
    pub id: String,
    /// Update kind, e.g. `reacted` or `deleted`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub body: Value,
}

impl PostUpdate {
    pub(crate) fn from_body(body: &Value) -> Option<Self> {
        serde_json::from_value(body.clone()).ok()
    }
}

/// Subscription handle for post updates on a stream.
///
/// Obtained from [`crate::Stream::post_feed`]. Listeners receive the whole
/// [`PostUpdate`], so one listener can serve many posts. Feed listeners are
/// detached when the stream closes, like channel listeners.
#[derive(Clone)]
pub struct PostFeed {
    inner: Arc<StreamInner>,
}

impl PostFeed {
    pub(crate) fn from_inner(inner: Arc<StreamInner>) -> Self {
        Self { inner }
    }

    /// Ask the server to start sending updates for one post.
    ///
    /// # Errors
    ///
    /// Fails like a stream send.
    pub async fn subscribe(&self, post_id: &str) -> Result<(), StreamError> {
        self.inner
            .send_frame(&Frame::event(TYPE_SUB_POST, json!({ "id": post_id })))
            .await
    }

    /// Stop updates for one post.
    ///
    /// # Errors
    ///
    /// Fails like a stream send.
    pub async fn unsubscribe(&self, post_id: &str) -> Result<(), StreamError> {
        self.inner
            .send_frame(&Frame::event(TYPE_UNSUB_POST, json!({ "id": post_id })))
            .await
    }

    /// Register a listener for one update kind.
    pub fn on(
        &self,
        ty: &str,
        handler: impl Fn(&PostUpdate) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.inner.feed_router().on(EventKey::typed(ty), handler)
    }

    /// Like [`PostFeed::on`], deregistered after the first invocation.
    pub fn once(
        &self,
        ty: &str,
        handler: impl Fn(&PostUpdate) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.inner.feed_router().once(EventKey::typed(ty), handler)
    }

    /// Remove one typed listener. Returns whether it was still registered.
    pub fn off(&self, ty: &str, token: ListenerToken) -> bool {
        self.inner.feed_router().off(&EventKey::typed(ty), token)
    }

    /// Remove every listener for one update kind.
    pub fn off_all(&self, ty: &str) {
        self.inner.feed_router().off_all(&EventKey::typed(ty));
    }

    /// Register a wildcard listener receiving every post update.
    ///
    /// Fires only while `wildcard_event_enabled` is set in the config.
    pub fn on_any(&self, handler: impl Fn(&PostUpdate) + Send + Sync + 'static) -> ListenerToken {
        self.inner.feed_router().on(EventKey::Any, handler)
    }

    /// Remove one wildcard listener.
    pub fn off_any(&self, token: ListenerToken) -> bool {
        self.inner.feed_router().off(&EventKey::Any, token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
