//! # Session Service
//!
//! Connection lifecycle on top of the transport channels.
//!
//! ## Components
//! - **State**: lifecycle states and the pure transition function
//! - **Delegate**: traits through which the engine reports to its owner
//! - **Pinger**: keep-alive loop for attached clients
//! - **Engine**: connect, disconnect and send for one radio at a time

pub mod delegate;
pub mod engine;
pub mod pinger;
pub mod state;

pub use delegate::{Delegates, MessageDelegate, NoopDelegate, StreamDelegate, TransportDelegate};
pub use engine::{ConnectTarget, ConnectionEngine, Topology, WanParams};
pub use state::{ConnectionState, DisconnectReason, StateEvent};
