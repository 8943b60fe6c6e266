//! Typed lifecycle callback capability, replacing a dynamically-probed
//! polymorphic logger with a trait whose methods default to no-ops.

use stomp_protocol::Frame;

use crate::error::ConnectionError;

/// Per-connection lifecycle callbacks. All methods have a no-op default, so
/// a caller only overrides what they care about. Callback panics are not
/// caught here — keep implementations simple, as the spec's propagation
/// policy for its logger hook is "best-effort, exceptions suppressed"; this
/// trait instead asks implementations not to panic, matching Rust's general
/// expectation that `Fn`-shaped callbacks don't unwind across FFI-like
/// boundaries.
pub trait ConnectionListener: Send + Sync {
    fn on_connect(&self, _frame: &Frame) {}
    fn on_disconnect(&self) {}
    fn on_subscribe(&self, _id: &str, _headers: &[(String, String)]) {}
    fn on_unsubscribe(&self, _id: &str) {}
    fn on_publish(&self, _frame: &Frame) {}
    fn on_message(&self, _frame: &Frame) {}
    fn on_error(&self, _error: &ConnectionError) {}
    fn on_reconnect_attempt(&self, _host: &str, _attempt: u32) {}
    fn on_heartbeat_timeout(&self) {}
}

/// The default listener: observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl ConnectionListener for NullListener {}
