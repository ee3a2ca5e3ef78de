//! Keep-alive loop.
//!
//! Sends `ping` on the command channel at a fixed interval and records the
//! round trip of each answered ping. The loop ends when stopped or when the
//! channel is no longer connected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::transport::tcp::CommandChannel;
use crate::utils::metrics::Metrics;

pub const PING_COMMAND: &str = "ping";

pub struct Pinger {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Pinger {
    pub fn start(channel: CommandChannel, interval: Duration, metrics: Arc<Metrics>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(channel, interval, metrics, cancel.clone()));
        debug!(interval_ms = interval.as_millis() as u64, "Pinger started");
        Self { cancel, task }
    }

    pub fn stop(self) {
        self.cancel.cancel();
        debug!("Pinger stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn run(
    channel: CommandChannel,
    interval: Duration,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sent_at = Instant::now();
        let metrics = metrics.clone();
        let result = channel.send(
            PING_COMMAND,
            false,
            Some(Box::new(move |reply| {
                let rtt = sent_at.elapsed();
                metrics.ping_round_trip(rtt.as_micros() as u64);
                trace!(sequence = reply.sequence, rtt_us = rtt.as_micros() as u64, "Ping answered");
            })),
        );

        match result {
            Ok(_) => {}
            Err(ProtocolError::NotConnected) => break,
            Err(e) => {
                debug!(error = %e, "Ping not sent");
                break;
            }
        }
    }
}
