//! Client-facing message types and the per-session event sink.

pub mod events;

pub use events::{ClientMessage, ServerEvent};

use tokio::sync::mpsc;
use tracing::trace;

/// Cloneable sender for outbound events. Sends after the transport has gone
/// away are dropped silently.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver closed; dropping event");
        }
    }
}
