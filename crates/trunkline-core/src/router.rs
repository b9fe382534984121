//! Ordered listener fan-out keyed by a closed event-key set.
//!
//! One `Router` instance backs each subscription scope (the stream itself,
//! each channel, the post feed). Keys are a closed enum rather than raw
//! strings, so there are no magic listener-name values anywhere; the only
//! dynamic part is the application-defined event type inside
//! [`EventKey::Type`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Key a listener registers under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// The reserved wildcard key: every event in the scope.
    Any,
    /// Events of one exact application type.
    Type(String),
}

impl EventKey {
    /// Convenience constructor for [`EventKey::Type`].
    #[must_use]
    pub fn typed(ty: impl Into<String>) -> Self {
        Self::Type(ty.into())
    }
}

/// Handle for removing a registered listener.
///
/// Tokens are unique per router and never reused, the Rust stand-in for
/// removal by callback identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    token: ListenerToken,
    once: bool,
    handler: Handler<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            once: self.once,
            handler: Arc::clone(&self.handler),
        }
    }
}

struct RouterInner<T> {
    slots: HashMap<EventKey, Vec<Entry<T>>>,
    next_token: u64,
}

/// Ordered listener registry with snapshot dispatch.
///
/// Emission order equals registration order. The listener list is snapshotted
/// before invocation and the lock released, so a handler may register or
/// remove listeners (including itself) without affecting the pass in flight
/// and without deadlocking.
pub struct Router<T> {
    inner: Mutex<RouterInner<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner {
                slots: HashMap::new(),
                next_token: 1,
            }),
        }
    }

    /// Register a listener under `key`. Returns the token used for removal.
    pub fn on(&self, key: EventKey, handler: impl Fn(&T) + Send + Sync + 'static) -> ListenerToken {
        self.register(key, false, Arc::new(handler))
    }

    /// Register a listener that is deregistered after its first invocation.
    pub fn once(
        &self,
        key: EventKey,
        handler: impl Fn(&T) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.register(key, true, Arc::new(handler))
    }

    fn register(&self, key: EventKey, once: bool, handler: Handler<T>) -> ListenerToken {
        let mut inner = self.inner.lock();
        let token = ListenerToken(inner.next_token);
        inner.next_token += 1;
        inner
            .slots
            .entry(key)
            .or_default()
            .push(Entry { token, once, handler });
        token
    }

    /// Remove one listener. Returns whether it was still registered.
    pub fn off(&self, key: &EventKey, token: ListenerToken) -> bool {
        let mut inner = self.inner.lock();
        let Some(entries) = inner.slots.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.token != token);
        let removed = entries.len() != before;
        if entries.is_empty() {
            let _ = inner.slots.remove(key);
        }
        removed
    }

    /// Remove every listener under one key.
    pub fn off_all(&self, key: &EventKey) {
        let _ = self.inner.lock().slots.remove(key);
    }

    /// Remove every listener under every key.
    pub fn clear(&self) {
        self.inner.lock().slots.clear();
    }

    /// Number of listeners currently registered under `key`.
    #[must_use]
    pub fn len(&self, key: &EventKey) -> usize {
        self.inner.lock().slots.get(key).map_or(0, Vec::len)
    }

    /// Whether no listener is registered under any key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Invoke the listeners registered under `key`, in registration order.
    ///
    /// `once` listeners leave the registry when the snapshot is taken, before
    /// any handler runs, so a handler that re-enters `emit` on the same key
    /// can never fire them a second time.
    pub fn emit(&self, key: &EventKey, payload: &T) {
        let snapshot: Vec<Entry<T>> = {
            let mut inner = self.inner.lock();
            let Some(entries) = inner.slots.get_mut(key) else {
                return;
            };
            let snapshot = entries.clone();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                let _ = inner.slots.remove(key);
            }
            snapshot
        };

        for entry in &snapshot {
            (entry.handler)(payload);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
