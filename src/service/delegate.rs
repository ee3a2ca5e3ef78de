//! Capability traits through which the engine reports to its owner.
//!
//! Each event category has its own trait so a collaborator implements only
//! what it consumes. Every method has a no-op default except
//! [`StreamDelegate::packet_received`].
//!
//! Callbacks run on engine tasks. They must not block, and must not call
//! back into `ConnectionEngine::connect` or `disconnect` synchronously.

use std::sync::Arc;

use crate::core::packet::Packet;
use crate::protocol::dispatcher::ReplyHandler;
use crate::protocol::message::InboundMessage;
use crate::service::state::ConnectionState;

/// Command channel traffic
pub trait MessageDelegate: Send + Sync {
    /// A sequenced command was queued for writing
    fn message_sent(&self, _sequence: u32, _command: &str) {}

    /// A non-reply line arrived
    fn message_received(&self, _message: &InboundMessage) {}

    /// Supply a reply handler for a command sent without one
    fn reply_handler_for(&self, _command: &str) -> Option<ReplyHandler> {
        None
    }
}

/// Lifecycle and failures
pub trait TransportDelegate: Send + Sync {
    fn state_changed(&self, _previous: &ConnectionState, _current: &ConnectionState) {}

    fn transport_error(&self, _message: &str) {}
}

/// Decoded stream packets
pub trait StreamDelegate: Send + Sync {
    fn packet_received(&self, packet: Packet);
}

/// Delegate that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl MessageDelegate for NoopDelegate {}

impl TransportDelegate for NoopDelegate {}

impl StreamDelegate for NoopDelegate {
    fn packet_received(&self, _packet: Packet) {}
}

/// The delegates one engine reports to
#[derive(Clone)]
pub struct Delegates {
    pub message: Arc<dyn MessageDelegate>,
    pub transport: Arc<dyn TransportDelegate>,
    pub stream: Arc<dyn StreamDelegate>,
}

impl Delegates {
    /// Use one object for all three roles
    pub fn shared<D>(delegate: Arc<D>) -> Self
    where
        D: MessageDelegate + TransportDelegate + StreamDelegate + 'static,
    {
        Self {
            message: delegate.clone(),
            transport: delegate.clone(),
            stream: delegate,
        }
    }
}

impl Default for Delegates {
    fn default() -> Self {
        Self::shared(Arc::new(NoopDelegate))
    }
}
