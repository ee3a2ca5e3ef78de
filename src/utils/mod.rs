//! # Utility Modules
//!
//! Supporting utilities for logging, timing and observability.
//!
//! ## Components
//! - **Logging**: tracing subscriber configuration
//! - **Timeout**: default durations and async timeout wrappers
//! - **Metrics**: thread-safe per-engine counters

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
