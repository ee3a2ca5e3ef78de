//! # Command Protocol
//!
//! The line-oriented command/reply protocol carried on the TCP channel.
//!
//! ## Components
//! - **Message**: outbound command formatting and inbound line classification
//! - **Dispatcher**: reply correlation table keyed by sequence number
//! - **Handshake**: firmware check, `client ip` resolution and WAN commands
//! - **Catalog**: command batches sent once a client is attached

pub mod catalog;
pub mod dispatcher;
pub mod handshake;
pub mod message;
