//! # Error Types
//!
//! Error handling for the radio protocol engine.
//!
//! This module defines all error variants that can occur while encoding or
//! decoding stream packets, parsing command-channel lines, and driving the
//! connection lifecycle.
//!
//! ## Error Categories
//! - **I/O Errors**: socket failures on the command or stream channel
//! - **Packet Errors**: short buffers, unknown enumerated header fields, length mismatches
//! - **Line Errors**: incomplete replies, unrecognized message types
//! - **Connection Errors**: timeouts, TLS failures, violated WAN preconditions
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Firmware mismatches and `client ip` handshake timeouts are not errors; they
//! are reported as warnings and the connection proceeds.
//!
//! ## Example Usage
//! ```rust
//! use sdr_link::core::packet::Packet;
//! use sdr_link::error::ProtocolError;
//! use tracing::debug;
//!
//! match Packet::from_bytes(&[0u8; 8]) {
//!     Ok(packet) => debug!(bytes = packet.payload.len(), "Decoded packet"),
//!     Err(ProtocolError::PacketTooShort(len)) => debug!(len, "Discarding short frame"),
//!     Err(e) => debug!(error = %e, "Discarding malformed frame"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Correlation table errors
    pub const ERR_REPLY_TABLE_WRITE_LOCK: &str = "Failed to acquire write lock on reply table";
    pub const ERR_REPLY_TABLE_READ_LOCK: &str = "Failed to acquire read lock on reply table";

    /// Engine state errors
    pub const ERR_STATE_LOCK: &str = "Failed to acquire connection state lock";
    pub const ERR_SESSION_LOCK: &str = "Failed to acquire session lock";
    pub const ERR_LINK_LOCK: &str = "Failed to acquire command link lock";
    pub const ERR_STREAM_LOCK: &str = "Failed to acquire stream binding lock";
    pub const ERR_TASK_LOCK: &str = "Failed to acquire engine task lock";

    /// Connection errors
    pub const ERR_ALREADY_CONNECTED: &str = "Command channel is already connected";
    pub const ERR_STREAM_NOT_BOUND: &str = "Stream channel is not bound";
    pub const ERR_WRITER_GONE: &str = "Command writer task has stopped";

    /// WAN errors
    pub const ERR_NO_LOCAL_INTERFACE: &str =
        "Hole punching requires a previously known local interface";
    pub const ERR_NO_CLIENT_HANDLE: &str =
        "Radio assigned no client handle; stream registration not sent";
}

/// Primary error type for all protocol engine operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Packet too short: {0} bytes (minimum 28)")]
    PacketTooShort(usize),

    #[error("Unknown packet type: {0:#x}")]
    UnknownPacketType(u8),

    #[error("Unknown timestamp kind: {0}")]
    UnknownTimestampKind(u8),

    #[error("Packet length mismatch: declared {declared} words, received {actual} bytes")]
    LengthMismatch { declared: u16, actual: usize },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Incomplete reply: {0}")]
    IncompleteReply(String),

    #[error("Unrecognized message type: {0:?}")]
    UnrecognizedMessage(char),

    #[error("Empty line")]
    EmptyLine,

    #[error("Line exceeds maximum length: {0} bytes")]
    LineTooLong(usize),

    #[error("Invalid discovery payload: {0}")]
    InvalidDiscovery(String),

    #[error("Duplicate pending sequence: {0}")]
    DuplicateSequence(u32),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Hole punch unavailable: {0}")]
    HolePunchUnavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
