//! # Command Channel
//!
//! Owns one ordered duplex TCP stream to the radio, optionally TLS-upgraded.
//!
//! Each connection runs two tasks: a reader that frames inbound bytes into
//! lines and forwards them as [`ChannelEvent::Line`], and a writer that drains
//! the outbound queue. Sequence assignment, reply registration and enqueueing
//! happen under one lock, so commands hit the wire in sequence order and a
//! reply can never arrive before its handler is registered.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpSocket;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::LineCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{ReplyHandler, ReplyTable};
use crate::protocol::message::OutboundCommand;
use crate::transport::tls;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout_error, SHUTDOWN_TIMEOUT};

/// Where and how to open the command stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub peer: SocketAddr,
    /// Local address to bind before connecting; port 0 lets the OS choose
    pub source: Option<SocketAddr>,
    /// Upgrade to TLS before reporting the channel live
    pub secure: bool,
    pub timeout: Duration,
}

/// Addresses of a live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub secure: bool,
}

/// Events delivered in arrival order for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One inbound line, without its terminator
    Line(String),
    /// The peer closed the stream (`None`) or I/O failed (`Some(error)`).
    /// Sent at most once per connection and never for [`CommandChannel::disconnect`].
    Closed(Option<String>),
}

pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

struct Link {
    next_sequence: u32,
    outbound: mpsc::UnboundedSender<String>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    info: ChannelInfo,
}

struct Inner {
    replies: ReplyTable,
    metrics: Arc<Metrics>,
    link: Mutex<Option<Link>>,
}

/// Sequenced command channel
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<Inner>,
}

impl CommandChannel {
    pub fn new(replies: ReplyTable, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                replies,
                metrics,
                link: Mutex::new(None),
            }),
        }
    }

    fn lock_link(&self) -> Result<MutexGuard<'_, Option<Link>>> {
        self.inner
            .link
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LINK_LOCK.to_string()))
    }

    /// Open the stream and start the reader and writer tasks.
    ///
    /// Returns once the channel is live: right after TCP connect, or after the
    /// TLS upgrade when `target.secure` is set.
    #[instrument(skip(self), fields(peer = %target.peer, secure = target.secure))]
    pub async fn connect(&self, target: &ChannelTarget) -> Result<(ChannelInfo, EventReceiver)> {
        if self.is_live()? {
            return Err(ProtocolError::InvalidState(
                constants::ERR_ALREADY_CONNECTED.to_string(),
            ));
        }

        let socket = match target.peer {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Some(source) = target.source {
            socket.set_reuseaddr(true)?;
            socket.bind(source)?;
        }

        let stream = with_timeout_error(
            async { socket.connect(target.peer).await.map_err(ProtocolError::Io) },
            target.timeout,
        )
        .await?;
        stream.set_nodelay(true)?;

        let info = ChannelInfo {
            local_addr: stream.local_addr()?,
            peer_addr: stream.peer_addr()?,
            secure: target.secure,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = if target.secure {
            let tls_stream = tls::upgrade(stream, target.peer.ip(), target.timeout).await?;
            self.spawn_link(tls_stream, info, events_tx)
        } else {
            self.spawn_link(stream, info, events_tx)
        };

        *self.lock_link()? = Some(link);
        info!(local = %info.local_addr, "Command channel live");
        Ok((info, events_rx))
    }

    fn spawn_link<S>(
        &self,
        stream: S,
        info: ChannelInfo,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Link
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let live = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            FramedRead::new(read_half, LineCodec::new()),
            events.clone(),
            live.clone(),
            cancel.clone(),
            self.inner.metrics.clone(),
        ));
        tokio::spawn(write_loop(
            FramedWrite::new(write_half, LineCodec::new()),
            outbound_rx,
            events,
            live.clone(),
            cancel.clone(),
        ));

        Link {
            next_sequence: 0,
            outbound: outbound_tx,
            live,
            cancel,
            info,
        }
    }

    /// Send `command` with the next sequence number and return that number.
    ///
    /// The handler, if any, is registered before the line is queued for writing.
    pub fn send(
        &self,
        command: &str,
        diagnostic: bool,
        handler: Option<ReplyHandler>,
    ) -> Result<u32> {
        let mut guard = self.lock_link()?;
        let link = guard
            .as_mut()
            .filter(|link| link.live.load(Ordering::SeqCst))
            .ok_or(ProtocolError::NotConnected)?;

        let sequence = link.next_sequence;
        link.next_sequence = sequence.wrapping_add(1);

        self.inner.replies.insert(sequence, command, handler)?;

        let line = OutboundCommand::new(sequence, command, diagnostic).to_line();
        if link.outbound.send(line).is_err() {
            self.inner.replies.cancel(sequence)?;
            return Err(ProtocolError::TransportError(
                constants::ERR_WRITER_GONE.to_string(),
            ));
        }

        self.inner.metrics.command_sent();
        debug!(sequence, command, diagnostic, "Command queued");
        Ok(sequence)
    }

    /// Write `text` verbatim, without a sequence number
    pub fn send_raw(&self, text: &str) -> Result<()> {
        let guard = self.lock_link()?;
        let link = guard
            .as_ref()
            .filter(|link| link.live.load(Ordering::SeqCst))
            .ok_or(ProtocolError::NotConnected)?;

        link.outbound.send(text.to_string()).map_err(|_| {
            ProtocolError::TransportError(constants::ERR_WRITER_GONE.to_string())
        })?;
        debug!(text, "Raw line queued");
        Ok(())
    }

    /// Close the stream. Returns true when this call ended a live connection.
    pub fn disconnect(&self) -> Result<bool> {
        let link = self.lock_link()?.take();
        let Some(link) = link else {
            return Ok(false);
        };

        let was_live = link.live.swap(false, Ordering::SeqCst);
        link.cancel.cancel();
        if was_live {
            info!(peer = %link.info.peer_addr, "Command channel closed");
        }
        Ok(was_live)
    }

    pub fn is_live(&self) -> Result<bool> {
        Ok(self
            .lock_link()?
            .as_ref()
            .is_some_and(|link| link.live.load(Ordering::SeqCst)))
    }

    /// Addresses of the current connection, if any
    pub fn info(&self) -> Result<Option<ChannelInfo>> {
        Ok(self.lock_link()?.as_ref().map(|link| link.info))
    }
}

/// Mark the link closed and report why, unless someone else already did
fn close_link(
    live: &AtomicBool,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    reason: Option<String>,
) {
    if live.swap(false, Ordering::SeqCst) {
        cancel.cancel();
        let _ = events.send(ChannelEvent::Closed(reason));
    }
}

async fn read_loop<R>(
    mut lines: FramedRead<R, LineCodec>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next() => match next {
                Some(Ok(line)) => {
                    metrics.line_received();
                    if events.send(ChannelEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Command channel read failed");
                    break Some(e.to_string());
                }
                None => {
                    debug!("Command channel closed by peer");
                    break None;
                }
            }
        }
    };

    close_link(&live, &cancel, &events, reason);
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, LineCodec>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = outbound.recv() => match line {
                Some(line) => {
                    if let Err(e) = writer.send(line).await {
                        warn!(error = %e, "Command channel write failed");
                        close_link(&live, &cancel, &events, Some(e.to_string()));
                        return;
                    }
                }
                None => break,
            }
        }
    }

    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.close()).await;
}
