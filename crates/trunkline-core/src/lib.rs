//! # trunkline-core
//!
//! Shared vocabulary for the Trunkline streaming client:
//!
//! - **Frames**: the `{type, body}` wire unit and the channel envelope
//! - **Router**: ordered listener fan-out with wildcard and once semantics
//! - **Errors**: the `StreamError` hierarchy via `thiserror`
//! - **Config**: the explicit `ClientConfig` record and its layered loader
//!
//! Nothing in this crate touches a socket; the transport and the stream
//! state machine live in `trunkline-stream`.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod frame;
pub mod router;

pub use config::{ClientConfig, ConfigError, config_path, load_config, load_config_from_path};
pub use error::StreamError;
pub use frame::{ChannelEnvelope, Frame, TYPE_CHANNEL, TYPE_CONNECT, TYPE_DISCONNECT};
pub use router::{EventKey, ListenerToken, Router};
