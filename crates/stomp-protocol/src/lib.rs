//! STOMP 1.0/1.1/1.2 frame model and wire codec.
//!
//! Pure, synchronous, transport-agnostic: this crate knows how to turn a
//! [`Frame`] into bytes and back for a given negotiated [`StompVersion`], and
//! nothing about sockets, reconnects, or subscriptions.

pub mod codec;
pub mod error;
pub mod escape;
pub mod frame;
pub mod version;

pub use codec::{OutboundItem, StompCodec, WireEvent};
pub use error::{FrameError, MalformedReason, ProtocolReason};
pub use frame::Frame;
pub use version::StompVersion;
