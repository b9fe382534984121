//! # trunkline-stream
//!
//! The streaming side of the Trunkline client: one persistent WebSocket
//! connection, multiplexed into independent logical channels.
//!
//! - [`Stream`] owns the connection and routes every inbound frame
//! - [`Channel`] is a logical subscription addressed by a client-allocated id
//! - [`PostFeed`] rides the same connection for per-post update events
//! - [`transport`] is the adapter seam: the production WebSocket
//!   implementation plus whatever test double a caller supplies
//!
//! All outbound traffic funnels through the stream's connection actor, so
//! writes are serialized and inbound frames are dispatched strictly in
//! arrival order.

#![deny(unsafe_code)]

pub mod channel;
pub mod feed;
pub mod stream;
pub mod transport;

pub use channel::Channel;
pub use feed::{PostFeed, PostUpdate};
pub use stream::{Stream, StreamState};
pub use transport::{
    Transport, TransportEvent, TransportReader, TransportWriter, WsTransport, build_stream_url,
};
