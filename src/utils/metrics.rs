//! Observability and Metrics
//!
//! Per-session traffic and failure counters for the command and stream
//! channels. Each engine owns its own [`Metrics`]; there is no process-wide
//! instance.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for one engine
#[derive(Debug)]
pub struct Metrics {
    /// TCP connect attempts
    pub connect_attempts: AtomicU64,
    /// Sessions that reached a live command channel
    pub connections_total: AtomicU64,
    /// Connect attempts that failed before the channel went live
    pub connect_failures: AtomicU64,
    /// Sessions that ended with an error
    pub disconnects_error: AtomicU64,
    /// Sequenced commands written
    pub commands_sent: AtomicU64,
    /// Lines received on the command channel
    pub lines_received: AtomicU64,
    /// Replies matched to a pending command
    pub replies_matched: AtomicU64,
    /// Replies with no pending command
    pub replies_orphaned: AtomicU64,
    /// Pending commands abandoned at disconnect
    pub replies_abandoned: AtomicU64,
    /// Lines that failed to parse
    pub lines_malformed: AtomicU64,
    /// Datagrams received on the stream channel
    pub datagrams_received: AtomicU64,
    /// Datagrams dropped because the decode queue was full
    pub datagrams_dropped: AtomicU64,
    /// Stream packets decoded successfully
    pub packets_decoded: AtomicU64,
    /// Stream packets rejected by the decoder
    pub packets_malformed: AtomicU64,
    /// Keep-alive round trip of the last answered ping, in microseconds
    pub last_ping_rtt_us: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            disconnects_error: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            replies_matched: AtomicU64::new(0),
            replies_orphaned: AtomicU64::new(0),
            replies_abandoned: AtomicU64::new(0),
            lines_malformed: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            packets_decoded: AtomicU64::new(0),
            packets_malformed: AtomicU64::new(0),
            last_ping_rtt_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnect_error(&self) {
        self.disconnects_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a reply lookup
    pub fn reply(&self, matched: bool) {
        if matched {
            self.replies_matched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.replies_orphaned.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn replies_abandoned(&self, count: usize) {
        self.replies_abandoned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn line_malformed(&self) {
        self.lines_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagram_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagram_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a stream packet decode
    pub fn packet(&self, decoded: bool) {
        if decoded {
            self.packets_decoded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.packets_malformed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn ping_round_trip(&self, micros: u64) {
        self.last_ping_rtt_us.store(micros, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            disconnects_error: self.disconnects_error.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            replies_orphaned: self.replies_orphaned.load(Ordering::Relaxed),
            replies_abandoned: self.replies_abandoned.load(Ordering::Relaxed),
            lines_malformed: self.lines_malformed.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            packets_malformed: self.packets_malformed.load(Ordering::Relaxed),
            last_ping_rtt_us: self.last_ping_rtt_us.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connect_attempts = snapshot.connect_attempts,
            connections_total = snapshot.connections_total,
            connect_failures = snapshot.connect_failures,
            disconnects_error = snapshot.disconnects_error,
            commands_sent = snapshot.commands_sent,
            lines_received = snapshot.lines_received,
            replies_matched = snapshot.replies_matched,
            replies_orphaned = snapshot.replies_orphaned,
            replies_abandoned = snapshot.replies_abandoned,
            lines_malformed = snapshot.lines_malformed,
            datagrams_received = snapshot.datagrams_received,
            datagrams_dropped = snapshot.datagrams_dropped,
            packets_decoded = snapshot.packets_decoded,
            packets_malformed = snapshot.packets_malformed,
            last_ping_rtt_us = snapshot.last_ping_rtt_us,
            uptime_seconds = snapshot.uptime_seconds,
            "Engine metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connections_total: u64,
    pub connect_failures: u64,
    pub disconnects_error: u64,
    pub commands_sent: u64,
    pub lines_received: u64,
    pub replies_matched: u64,
    pub replies_orphaned: u64,
    pub replies_abandoned: u64,
    pub lines_malformed: u64,
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub packets_decoded: u64,
    pub packets_malformed: u64,
    pub last_ping_rtt_us: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
