//! # Core Protocol Components
//!
//! Stateless wire formats: stream packets, discovery payloads and command
//! line framing. Nothing in this module performs I/O.
//!
//! ## Components
//! - **Packet**: VITA-49 derived stream frame with flag-selected optional words
//! - **Discovery**: `key=value` payload carried by discovery broadcasts
//! - **Codec**: Tokio codec for newline framing over the command stream
//!
//! ## Wire Format
//! ```text
//! [type|C|T][TSI|TSF|seq][len words:16] [stream id] [class id:2] [int ts] [frac ts:2] [payload] [trailer]
//! ```
//!
//! ## Safety
//! - Frames under 28 bytes are rejected before any field is read
//! - Declared length must agree with the received byte count
//! - Command lines are capped at 64 KiB

pub mod codec;
pub mod discovery;
pub mod packet;
