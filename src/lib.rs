//! # sdr-link
//!
//! Client protocol engine for networked software-defined radios.
//!
//! A radio session has two channels:
//! - a TCP command channel carrying newline-terminated, sequence-numbered
//!   commands and their replies (TLS-upgraded when brokered over the WAN)
//! - a UDP stream channel carrying VITA-49 derived packets: meters, audio,
//!   IQ data and discovery broadcasts
//!
//! ## Modules
//! - [`core`]: wire formats with no I/O (stream packets, discovery, line framing)
//! - [`protocol`]: command formatting, reply correlation, handshake helpers
//! - [`transport`]: the TCP, TLS and UDP channels
//! - [`service`]: the connection engine, its state machine and delegates
//! - [`config`]: TOML and environment configuration
//! - [`utils`]: logging setup, timeouts and metrics
//!
//! ## Example
//! ```no_run
//! use sdr_link::config::EngineConfig;
//! use sdr_link::core::discovery::DiscoveryRecord;
//! use sdr_link::service::{ConnectTarget, ConnectionEngine, Delegates};
//!
//! # async fn run() -> sdr_link::error::Result<()> {
//! let engine = ConnectionEngine::new(EngineConfig::from_env()?, Delegates::default())?;
//! let record = DiscoveryRecord::parse("model=FLEX-6600 serial=1234-5678 ip=192.168.1.40 port=4992")
//!     .ok_or(sdr_link::error::ProtocolError::InvalidDiscovery("incomplete".into()))?;
//!
//! if engine.connect(ConnectTarget::lan(&record)?).await {
//!     engine.send("info", false, Some(Box::new(|reply| println!("{}", reply.message))))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::EngineConfig;
pub use error::{ProtocolError, Result};
pub use service::{ConnectTarget, ConnectionEngine, ConnectionState, Delegates};
