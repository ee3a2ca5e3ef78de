//! # Transport Layer
//!
//! Network channels between the client and the radio.
//!
//! ## Channels
//! - **TCP**: ordered command channel with line framing and sequence numbers
//! - **TLS**: upgrade for WAN command channels; the radio's certificate is accepted as-is
//! - **UDP**: best-effort stream channel delivering decoded VITA-49 packets
//!
//! Neither channel reconnects on its own. The connection engine decides what
//! happens after a close.

pub mod tcp;
pub mod tls;
pub mod udp;

pub use tcp::{ChannelEvent, ChannelInfo, ChannelTarget, CommandChannel, EventReceiver};
pub use udp::StreamChannel;
