//! # Stream Channel
//!
//! UDP socket carrying VITA-49 stream packets.
//!
//! Reception is split across two tasks: a reader that pulls datagrams off the
//! socket and a decoder that turns them into [`Packet`]s for the
//! [`StreamDelegate`]. The queue between them is bounded; when the decoder
//! falls behind, datagrams are dropped and counted.
//!
//! Port-unreachable echoes on a connected socket are ignored. Any other
//! receive failure stops the reader and is reported once through the
//! [`FailureHook`].

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::service::delegate::StreamDelegate;
use crate::utils::metrics::Metrics;

/// Datagrams buffered between the reader and the decoder
pub const DECODE_QUEUE_DEPTH: usize = 1024;

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 64 * 1024;

/// Called once when the socket fails and reception stops
pub type FailureHook = Box<dyn FnOnce(ProtocolError) + Send + 'static>;

#[derive(Default)]
struct Binding {
    socket: Option<Arc<UdpSocket>>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

/// UDP stream channel
#[derive(Clone, Default)]
pub struct StreamChannel {
    binding: Arc<Mutex<Binding>>,
}

impl StreamChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Binding>> {
        self.binding
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_STREAM_LOCK.to_string()))
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.lock()?.socket.clone().ok_or_else(|| {
            ProtocolError::TransportError(constants::ERR_STREAM_NOT_BOUND.to_string())
        })
    }

    /// Bind to `ip:port` and return the port actually bound
    #[instrument(skip(self))]
    pub async fn bind(&self, ip: IpAddr, port: u16) -> Result<u16> {
        if self.lock()?.socket.is_some() {
            return Err(ProtocolError::InvalidState(
                "Stream channel is already bound".to_string(),
            ));
        }

        let socket = UdpSocket::bind(SocketAddr::new(ip, port)).await?;
        let bound = socket.local_addr()?.port();

        let mut binding = self.lock()?;
        if binding.socket.is_some() {
            return Err(ProtocolError::InvalidState(
                "Stream channel is already bound".to_string(),
            ));
        }
        binding.socket = Some(Arc::new(socket));
        info!(port = bound, "Stream channel bound");
        Ok(bound)
    }

    /// Restrict the socket to `peer`; sends go there and nothing else is received
    pub async fn connect_peer(&self, peer: SocketAddr) -> Result<()> {
        let socket = self.socket()?;
        socket.connect(peer).await?;
        debug!(%peer, "Stream channel bound to peer");
        Ok(())
    }

    /// Start receiving and delivering packets to `delegate`
    pub fn start(
        &self,
        delegate: Arc<dyn StreamDelegate>,
        metrics: Arc<Metrics>,
        on_failure: Option<FailureHook>,
    ) -> Result<()> {
        let mut binding = self.lock()?;
        let socket = binding.socket.clone().ok_or_else(|| {
            ProtocolError::TransportError(constants::ERR_STREAM_NOT_BOUND.to_string())
        })?;
        if binding.cancel.is_some() {
            return Err(ProtocolError::InvalidState(
                "Stream channel is already started".to_string(),
            ));
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(DECODE_QUEUE_DEPTH);

        let reader = tokio::spawn(read_loop(
            socket,
            tx,
            cancel.clone(),
            metrics.clone(),
            on_failure,
        ));
        let decoder = tokio::spawn(decode_loop(rx, delegate, cancel.clone(), metrics));

        binding.cancel = Some(cancel);
        binding.tasks = vec![reader, decoder];
        Ok(())
    }

    /// Encode and send one packet to the bound peer
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        self.socket()?.send(&bytes).await?;
        Ok(())
    }

    /// Send a text datagram to the bound peer
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.socket()?.send(text.as_bytes()).await?;
        debug!(text, "Stream text datagram sent");
        Ok(())
    }

    /// Stop the tasks and release the socket without waiting
    pub fn unbind(&self) -> Result<bool> {
        let binding = std::mem::take(&mut *self.lock()?);
        Ok(Self::release(binding).is_some())
    }

    /// Stop the tasks and wait until they have exited, so the port is free
    /// when this returns
    pub async fn force_unbind(&self) -> Result<bool> {
        let binding = std::mem::take(&mut *self.lock()?);
        let Some(tasks) = Self::release(binding) else {
            return Ok(false);
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Stream task ended abnormally");
            }
        }
        Ok(true)
    }

    fn release(binding: Binding) -> Option<Vec<JoinHandle<()>>> {
        let Binding {
            socket,
            cancel,
            tasks,
        } = binding;
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let socket = socket?;
        if let Ok(addr) = socket.local_addr() {
            info!(port = addr.port(), "Stream channel unbound");
        }
        Some(tasks)
    }

    pub fn local_port(&self) -> Option<u16> {
        self.lock()
            .ok()?
            .socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .map(|addr| addr.port())
    }

    pub fn is_bound(&self) -> bool {
        self.lock().map(|b| b.socket.is_some()).unwrap_or(false)
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    queue: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
    mut on_failure: Option<FailureHook>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _from)) => {
                    metrics.datagram_received();
                    match queue.try_send(Bytes::copy_from_slice(&buf[..len])) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => metrics.datagram_dropped(),
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Err(e) if is_unreachable_echo(&e) => {
                    debug!(error = %e, "Peer port unreachable");
                }
                Err(e) => {
                    warn!(error = %e, "Stream receive failed; stopping reception");
                    if let Some(hook) = on_failure.take() {
                        hook(ProtocolError::Io(e));
                    }
                    break;
                }
            }
        }
    }
}

/// ICMP port unreachable, surfaced by connected sockets on the next receive
fn is_unreachable_echo(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

async fn decode_loop(
    mut queue: mpsc::Receiver<Bytes>,
    delegate: Arc<dyn StreamDelegate>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        let datagram = tokio::select! {
            _ = cancel.cancelled() => break,
            datagram = queue.recv() => match datagram {
                Some(datagram) => datagram,
                None => break,
            }
        };

        match Packet::from_bytes(&datagram) {
            Ok(packet) => {
                metrics.packet(true);
                delegate.packet_received(packet);
            }
            Err(e) => {
                metrics.packet(false);
                debug!(error = %e, len = datagram.len(), "Discarding malformed stream packet");
            }
        }
    }
}
