//! # Connection Engine
//!
//! Drives one radio session from TCP connect to teardown.
//!
//! ## Session Workflow
//! 1. Open the command channel (TLS for WAN) and spawn the dispatch task
//! 2. Bind the stream channel
//! 3. On client attach: resolve the client address, send the command
//!    catalog, advertise the stream port, start the pinger
//! 4. On close: stop the pinger, release the stream channel, abandon
//!    pending replies, report the reason
//!
//! LAN sessions wait at step 3 until the owner calls
//! [`ConnectionEngine::client_attached`]. WAN sessions attach as soon as the
//! stream channel is bound.
//!
//! Connect and disconnect are serialised. Nothing is retried: after a
//! failure the owner decides whether to connect again.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::core::discovery::DiscoveryRecord;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::catalog::CatalogContext;
use crate::protocol::dispatcher::{ReplyHandler, ReplyTable};
use crate::protocol::handshake::{
    resolve_client_ip, udp_port_command, udp_register_payload, wan_validate_command,
    FirmwareCheck, CLIENT_IP_COMMAND,
};
use crate::protocol::message::{ClientHandle, InboundMessage, ProtocolVersion};
use crate::service::delegate::Delegates;
use crate::service::pinger::Pinger;
use crate::service::state::{ConnectionState, DisconnectReason, StateEvent};
use crate::transport::tcp::{ChannelEvent, ChannelTarget, CommandChannel, EventReceiver};
use crate::transport::udp::{FailureHook, StreamChannel};
use crate::utils::metrics::{Metrics, MetricsSnapshot, Timer};

/// Relay-brokered connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanParams {
    /// Session handle issued by the relay, forwarded in `wan validate`
    pub handle: String,
    pub public_tls_port: u16,
    pub public_udp_port: u16,
    /// When set, both channels use this port on both ends
    pub hole_punch_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    Lan,
    Wan(WanParams),
}

/// The radio to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub serial: String,
    pub address: IpAddr,
    /// Firmware version the radio advertised, if known
    pub firmware: Option<String>,
    pub topology: Topology,
}

impl ConnectTarget {
    /// LAN target from a discovery broadcast
    pub fn lan(record: &DiscoveryRecord) -> Result<Self> {
        let address = record.address().ok_or_else(|| {
            ProtocolError::InvalidDiscovery(format!("unparseable radio address {:?}", record.ip))
        })?;
        Ok(Self {
            serial: record.serial.clone(),
            address,
            firmware: record.version.clone(),
            topology: Topology::Lan,
        })
    }

    /// WAN target; add the advertised firmware with [`Self::with_firmware`]
    pub fn wan(serial: impl Into<String>, address: IpAddr, params: WanParams) -> Self {
        Self {
            serial: serial.into(),
            address,
            firmware: None,
            topology: Topology::Wan(params),
        }
    }

    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = Some(firmware.into());
        self
    }

    pub fn is_wan(&self) -> bool {
        matches!(self.topology, Topology::Wan(_))
    }
}

/// Facts learned during one session
#[derive(Debug, Default)]
struct Session {
    generation: u64,
    live: bool,
    target: Option<ConnectTarget>,
    firmware: Option<FirmwareCheck>,
    handle: Option<ClientHandle>,
    protocol_version: Option<ProtocolVersion>,
    local_ip: Option<IpAddr>,
    client_ip: Option<IpAddr>,
    udp_port: Option<u16>,
}

struct Inner {
    config: EngineConfig,
    state: RwLock<ConnectionState>,
    session: RwLock<Session>,
    replies: ReplyTable,
    /// Handle assigned by the radio in the current session
    handle: watch::Sender<Option<ClientHandle>>,
    command: CommandChannel,
    stream: StreamChannel,
    delegates: Delegates,
    metrics: Arc<Metrics>,
    pinger: Mutex<Option<Pinger>>,
    dispatch: Mutex<Option<CancellationToken>>,
    lifecycle: tokio::sync::Mutex<()>,
}

/// Client protocol engine for one radio at a time
#[derive(Clone)]
pub struct ConnectionEngine {
    inner: Arc<Inner>,
}

impl ConnectionEngine {
    /// Create an idle engine. Fails when `config` does not validate.
    pub fn new(config: EngineConfig, delegates: Delegates) -> Result<Self> {
        config.validate_strict()?;

        let replies = ReplyTable::new();
        let metrics = Arc::new(Metrics::new());
        let command = CommandChannel::new(replies.clone(), metrics.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(ConnectionState::Idle),
                session: RwLock::new(Session::default()),
                replies,
                handle: watch::channel(None).0,
                command,
                stream: StreamChannel::new(),
                delegates,
                metrics,
                pinger: Mutex::new(None),
                dispatch: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Connect to `target`, replacing any session with a different radio.
    ///
    /// Returns true once the command channel is live, or immediately when
    /// already connected to `target`.
    #[instrument(skip(self, target), fields(serial = %target.serial, address = %target.address))]
    pub async fn connect(&self, target: ConnectTarget) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;
        match self.connect_locked(target).await {
            Ok(connected) => connected,
            Err(e) => {
                error!(error = %e, "Connect failed");
                false
            }
        }
    }

    async fn connect_locked(&self, target: ConnectTarget) -> Result<bool> {
        let plan = match self.plan(&target) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Connect precondition failed");
                self.inner.delegates.transport.transport_error(&e.to_string());
                return Ok(false);
            }
        };

        if self.state().is_active() {
            if self.read_session().target.as_ref() == Some(&target) {
                debug!("Already connected to this radio");
                return Ok(true);
            }
            info!("Closing current session before switching radios");
            self.teardown().await?;
        }

        self.transition(StateEvent::Connect)?;
        self.inner.metrics.connect_attempt();
        let _timer = Timer::start("connect");

        let (info, events) = match self.inner.command.connect(&plan).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(error = %e, peer = %plan.peer, "Command channel connect failed");
                self.inner.metrics.connect_failed();
                self.transition(StateEvent::Abort)?;
                self.inner.delegates.transport.transport_error(&e.to_string());
                return Ok(false);
            }
        };
        self.inner.metrics.connection_established();

        let firmware = FirmwareCheck::compare(
            &self.inner.config.client.supported_firmware,
            target.firmware.as_deref().unwrap_or(""),
        );
        let local_ip = info.local_addr.ip();

        let generation = {
            let mut session = self.session_write()?;
            let generation = session.generation.wrapping_add(1);
            *session = Session {
                generation,
                live: true,
                target: Some(target.clone()),
                firmware: Some(firmware),
                local_ip: Some(local_ip),
                ..Session::default()
            };
            generation
        };
        self.inner.handle.send_replace(None);

        self.transition(StateEvent::TcpLive)?;
        self.spawn_dispatch(generation, events)?;

        match &target.topology {
            Topology::Lan => {
                let bound = self
                    .inner
                    .stream
                    .bind(local_ip, self.inner.config.ports.stream)
                    .await;
                match bound {
                    Ok(port) => {
                        if !self.start_stream(generation, port)? {
                            debug!("Session ended while the stream channel was binding");
                        }
                    }
                    Err(e) => self.abandon(generation, e).await?,
                }
            }
            Topology::Wan(wan) => {
                let port = match self.open_wan(target.address, local_ip, wan).await {
                    Ok(port) => port,
                    Err(e) => {
                        self.abandon(generation, e).await?;
                        return Ok(true);
                    }
                };
                if self.start_stream(generation, port)?
                    && self.transition(StateEvent::ClientAttached)?.is_some()
                {
                    if let Err(e) = self.on_client_connected(generation).await {
                        warn!(error = %e, "Client setup incomplete");
                    }
                }
            }
        }

        Ok(true)
    }

    /// Channel parameters for `target`; checks the hole-punch precondition
    fn plan(&self, target: &ConnectTarget) -> Result<ChannelTarget> {
        let client = &self.inner.config.client;
        let interface = client.local_interface;
        let any_port = |ip: IpAddr| SocketAddr::new(ip, 0);

        let plan = match &target.topology {
            Topology::Lan => ChannelTarget {
                peer: SocketAddr::new(target.address, self.inner.config.ports.command),
                source: interface.map(any_port),
                secure: false,
                timeout: client.connection_timeout,
            },
            Topology::Wan(wan) => match wan.hole_punch_port {
                Some(port) => {
                    let local = interface
                        .or(self.read_session().local_ip)
                        .filter(|ip| !ip.is_unspecified())
                        .ok_or_else(|| {
                            ProtocolError::HolePunchUnavailable(
                                constants::ERR_NO_LOCAL_INTERFACE.to_string(),
                            )
                        })?;
                    ChannelTarget {
                        peer: SocketAddr::new(target.address, port),
                        source: Some(SocketAddr::new(local, port)),
                        secure: true,
                        timeout: client.connection_timeout,
                    }
                }
                None => ChannelTarget {
                    peer: SocketAddr::new(target.address, wan.public_tls_port),
                    source: interface.map(any_port),
                    secure: true,
                    timeout: client.connection_timeout,
                },
            },
        };
        Ok(plan)
    }

    /// Validate the relay handle and bind the stream channel to the radio
    async fn open_wan(&self, radio: IpAddr, local_ip: IpAddr, wan: &WanParams) -> Result<u16> {
        self.send_command(&wan_validate_command(&wan.handle), false, None)?;

        let port = self
            .inner
            .stream
            .bind(local_ip, wan.hole_punch_port.unwrap_or(0))
            .await?;
        let udp_peer = wan.hole_punch_port.unwrap_or(wan.public_udp_port);
        self.inner
            .stream
            .connect_peer(SocketAddr::new(radio, udp_peer))
            .await?;
        Ok(port)
    }

    /// Start delivering stream packets. Returns false when the session ended
    /// while the socket was being bound.
    fn start_stream(&self, generation: u64, port: u16) -> Result<bool> {
        {
            let mut session = self.session_write()?;
            if !session.live || session.generation != generation {
                drop(session);
                self.inner.stream.unbind()?;
                return Ok(false);
            }
            session.udp_port = Some(port);
        }

        let engine = self.clone();
        let on_failure: FailureHook = Box::new(move |cause| {
            tokio::spawn(async move {
                let reason = DisconnectReason::Error(cause.to_string());
                if let Err(e) = engine.close_session(Some(generation), reason).await {
                    error!(error = %e, "Session close failed");
                }
            });
        });
        self.inner.stream.start(
            self.inner.delegates.stream.clone(),
            self.inner.metrics.clone(),
            Some(on_failure),
        )?;
        self.transition(StateEvent::UdpBound)?;
        Ok(true)
    }

    /// Close a session that could not finish setting up
    async fn abandon(&self, generation: u64, cause: ProtocolError) -> Result<()> {
        warn!(error = %cause, "Stream channel setup failed");
        self.close_session(Some(generation), DisconnectReason::Error(cause.to_string()))
            .await?;
        Ok(())
    }

    fn spawn_dispatch(&self, generation: u64, events: EventReceiver) -> Result<()> {
        let cancel = CancellationToken::new();
        let previous = self.lock_dispatch()?.replace(cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let engine = self.clone();
        tokio::spawn(async move {
            let mut events = UnboundedReceiverStream::new(events);
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => event,
                };

                match event {
                    Some(ChannelEvent::Line(line)) => engine.handle_line(&line),
                    Some(ChannelEvent::Closed(error)) => {
                        let reason = error.map_or(DisconnectReason::Normal, DisconnectReason::Error);
                        if let Err(e) = engine.close_session(Some(generation), reason).await {
                            error!(error = %e, "Session close failed");
                        }
                        break;
                    }
                    None => break,
                }
            }
            debug!(generation, "Dispatch task finished");
        });
        Ok(())
    }

    fn handle_line(&self, line: &str) {
        let message = match InboundMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                self.inner.metrics.line_malformed();
                warn!(error = %e, line, "Discarding malformed line");
                return;
            }
        };

        match message {
            InboundMessage::Reply(reply) => match self.inner.replies.complete(reply) {
                Ok(matched) => self.inner.metrics.reply(matched),
                Err(e) => error!(error = %e, "Reply dispatch failed"),
            },
            message => {
                self.record(&message);
                self.inner.delegates.message.message_received(&message);
            }
        }
    }

    fn record(&self, message: &InboundMessage) {
        if !matches!(message, InboundMessage::Handle(_) | InboundMessage::Version(_)) {
            return;
        }
        let mut session = match self.session_write() {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Session update failed");
                return;
            }
        };

        match message {
            InboundMessage::Handle(handle) => {
                info!(handle = %handle, "Client handle assigned");
                session.handle = Some(handle.clone());
                self.inner.handle.send_replace(Some(handle.clone()));
            }
            InboundMessage::Version(version) => {
                info!(%version, "Radio protocol version");
                session.protocol_version = Some(*version);
            }
            _ => {}
        }
    }

    /// Report that the radio has attached this client (LAN sessions).
    ///
    /// The remaining setup runs on a spawned task; await the handle to know
    /// when it is done.
    pub fn client_attached(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let _lifecycle = engine.inner.lifecycle.lock().await;
            if let Err(e) = engine.attach().await {
                warn!(error = %e, "Client setup incomplete");
            }
        })
    }

    async fn attach(&self) -> Result<()> {
        let generation = {
            let session = self.read_session();
            let lan = session.target.as_ref().is_some_and(|t| !t.is_wan());
            if !session.live || !lan {
                debug!("Ignoring client attach outside a LAN session");
                return Ok(());
            }
            session.generation
        };

        if self.transition(StateEvent::ClientAttached)?.is_none() {
            return Ok(());
        }
        self.on_client_connected(generation).await
    }

    #[instrument(skip(self))]
    async fn on_client_connected(&self, generation: u64) -> Result<()> {
        let (supports_client_ip, local_ip) = {
            let session = self.read_session();
            if !session.live || session.generation != generation {
                return Ok(());
            }
            let supports = session
                .firmware
                .as_ref()
                .is_some_and(FirmwareCheck::supports_client_ip);
            let local = session
                .local_ip
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            (supports, local)
        };

        let client_ip = if supports_client_ip {
            self.request_client_ip(local_ip).await
        } else {
            local_ip
        };
        self.session_write()?.client_ip = Some(client_ip);
        info!(%client_ip, "Client address resolved");

        let client = &self.inner.config.client;
        let context = CatalogContext {
            program: client.program.clone(),
            station: client.station.clone(),
            full_client: client.full_client,
            low_bandwidth: client.low_bandwidth,
        };
        for command in self.inner.config.commands.commands(&context) {
            self.send(&command, false, None)?;
        }

        self.advertise_stream_port().await?;

        let pinger = Pinger::start(
            self.inner.command.clone(),
            client.ping_interval,
            self.inner.metrics.clone(),
        );
        let previous = self.lock_pinger()?.replace(pinger);
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    async fn request_client_ip(&self, local_ip: IpAddr) -> IpAddr {
        let (tx, rx) = oneshot::channel();
        let handler: ReplyHandler = Box::new(move |reply| {
            let _ = tx.send(reply);
        });
        if let Err(e) = self.send_command(CLIENT_IP_COMMAND, false, Some(handler)) {
            warn!(error = %e, "Could not ask for the client address");
            return local_ip;
        }

        let timeout = self.inner.config.client.client_ip_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => resolve_client_ip(Some(&reply), local_ip),
            Ok(Err(_)) => {
                debug!("Client address request abandoned");
                local_ip
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "No reply to client ip; using the local address"
                );
                resolve_client_ip(None, local_ip)
            }
        }
    }

    async fn advertise_stream_port(&self) -> Result<()> {
        let (wan, port) = {
            let session = self.read_session();
            (
                session.target.as_ref().is_some_and(ConnectTarget::is_wan),
                session.udp_port,
            )
        };

        if !wan {
            let port = port.ok_or_else(|| {
                ProtocolError::TransportError(constants::ERR_STREAM_NOT_BOUND.to_string())
            })?;
            self.send(&udp_port_command(port), false, None)?;
            return Ok(());
        }

        let handle = self.wait_for_handle().await.ok_or_else(|| {
            ProtocolError::TransportError(constants::ERR_NO_CLIENT_HANDLE.to_string())
        })?;
        self.inner
            .stream
            .send_text(&udp_register_payload(&handle))
            .await
    }

    /// The session's client handle, waiting up to the client ip timeout for
    /// the radio to assign one
    async fn wait_for_handle(&self) -> Option<ClientHandle> {
        let mut handles = self.inner.handle.subscribe();
        let timeout = self.inner.config.client.client_ip_timeout;
        let waited = tokio::time::timeout(timeout, handles.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(handle)) => (*handle).clone(),
            _ => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Radio has not assigned a client handle"
                );
                None
            }
        }
    }

    /// End the current session. Returns true when there was one.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;
        match self.teardown().await {
            Ok(closed) => closed,
            Err(e) => {
                error!(error = %e, "Disconnect failed");
                false
            }
        }
    }

    async fn teardown(&self) -> Result<bool> {
        let closed = self.close_session(None, DisconnectReason::Normal).await?;
        self.session_write()?.target = None;
        Ok(closed)
    }

    /// Tear down the session `generation` (or whichever is live when `None`)
    async fn close_session(&self, generation: Option<u64>, reason: DisconnectReason) -> Result<bool> {
        let wan = {
            let mut session = self.session_write()?;
            if !session.live || generation.is_some_and(|g| g != session.generation) {
                return Ok(false);
            }
            session.live = false;
            session.target.as_ref().is_some_and(ConnectTarget::is_wan)
        };

        let pinger = self.lock_pinger()?.take();
        if let Some(pinger) = pinger {
            pinger.stop();
        }
        let dispatch = self.lock_dispatch()?.take();
        if let Some(dispatch) = dispatch {
            dispatch.cancel();
        }

        self.inner.command.disconnect()?;
        if wan && matches!(reason, DisconnectReason::Error(_)) {
            self.inner.stream.force_unbind().await?;
        } else {
            self.inner.stream.unbind()?;
        }

        let abandoned = self.inner.replies.flush()?;
        if abandoned > 0 {
            self.inner.metrics.replies_abandoned(abandoned);
            debug!(abandoned, "Pending commands abandoned");
        }

        self.transition(StateEvent::ChannelClosed(reason.clone()))?;
        if let DisconnectReason::Error(message) = &reason {
            self.inner.metrics.disconnect_error();
            self.inner.delegates.transport.transport_error(message);
        }
        info!(%reason, "Session closed");
        self.inner.metrics.log_metrics();
        Ok(true)
    }

    /// Send a sequenced command and return its sequence number.
    ///
    /// Without a handler, the message delegate is asked for one.
    pub fn send(&self, command: &str, diagnostic: bool, handler: Option<ReplyHandler>) -> Result<u32> {
        let handler = handler.or_else(|| self.inner.delegates.message.reply_handler_for(command));
        self.send_command(command, diagnostic, handler)
    }

    fn send_command(
        &self,
        command: &str,
        diagnostic: bool,
        handler: Option<ReplyHandler>,
    ) -> Result<u32> {
        let sequence = self.inner.command.send(command, diagnostic, handler)?;
        self.inner.delegates.message.message_sent(sequence, command);
        Ok(sequence)
    }

    /// Write a line verbatim, without a sequence number
    pub fn send_raw(&self, text: &str) -> Result<()> {
        self.inner.command.send_raw(text)
    }

    /// Mark the session as running a firmware update
    pub fn begin_update(&self) -> Result<()> {
        match self.transition(StateEvent::UpdateStarted)? {
            Some(_) => Ok(()),
            None => Err(ProtocolError::InvalidState(format!(
                "cannot begin an update while {}",
                self.state()
            ))),
        }
    }

    /// Apply `event`, notifying the transport delegate on change
    fn transition(&self, event: StateEvent) -> Result<Option<ConnectionState>> {
        let (previous, current) = {
            let mut state = self
                .inner
                .state
                .write()
                .map_err(|_| ProtocolError::Custom(constants::ERR_STATE_LOCK.to_string()))?;
            let Some(next) = state.on(event.clone()) else {
                warn!(state = %*state, ?event, "Ignoring state event");
                return Ok(None);
            };
            let previous = std::mem::replace(&mut *state, next.clone());
            (previous, next)
        };

        info!(from = %previous, to = %current, "Connection state changed");
        self.inner
            .delegates
            .transport
            .state_changed(&previous, &current);
        Ok(Some(current))
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session_write(&self) -> Result<RwLockWriteGuard<'_, Session>> {
        self.inner
            .session
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_SESSION_LOCK.to_string()))
    }

    fn lock_pinger(&self) -> Result<MutexGuard<'_, Option<Pinger>>> {
        self.inner
            .pinger
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_TASK_LOCK.to_string()))
    }

    fn lock_dispatch(&self) -> Result<MutexGuard<'_, Option<CancellationToken>>> {
        self.inner
            .dispatch
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_TASK_LOCK.to_string()))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn target(&self) -> Option<ConnectTarget> {
        self.read_session().target.clone()
    }

    /// Address of the local end of the command channel
    pub fn local_ip(&self) -> Option<IpAddr> {
        self.read_session().local_ip
    }

    /// Client address as the radio sees it
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.read_session().client_ip
    }

    pub fn local_udp_port(&self) -> Option<u16> {
        self.read_session().udp_port
    }

    pub fn client_handle(&self) -> Option<ClientHandle> {
        self.read_session().handle.clone()
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.read_session().protocol_version
    }

    pub fn firmware(&self) -> Option<FirmwareCheck> {
        self.read_session().firmware.clone()
    }

    /// Whether the keep-alive loop is running
    pub fn is_pinging(&self) -> bool {
        self.lock_pinger()
            .map(|pinger| pinger.as_ref().is_some_and(Pinger::is_running))
            .unwrap_or(false)
    }

    pub fn pending_replies(&self) -> usize {
        self.inner.replies.len().unwrap_or(0)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> DiscoveryRecord {
        DiscoveryRecord::parse("model=FLEX-6600 serial=1234-5678 ip=192.168.1.40 port=4992 version=3.8.19.32140")
            .unwrap()
    }

    #[test]
    fn lan_target_from_discovery() {
        let target = ConnectTarget::lan(&record()).unwrap();
        assert_eq!(target.serial, "1234-5678");
        assert_eq!(target.address, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)));
        assert_eq!(target.firmware.as_deref(), Some("3.8.19.32140"));
        assert!(!target.is_wan());
    }

    #[test]
    fn lan_target_rejects_bad_address() {
        let mut record = record();
        record.ip = "radio.local".into();
        assert!(matches!(
            ConnectTarget::lan(&record),
            Err(ProtocolError::InvalidDiscovery(_))
        ));
    }

    #[test]
    fn hole_punch_plan_uses_same_port_both_ends() {
        let config = EngineConfig::default_with_overrides(|c| {
            c.client.local_interface = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        });
        let engine = ConnectionEngine::new(config, Delegates::default()).unwrap();
        let target = ConnectTarget::wan(
            "1234-5678",
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)),
            WanParams {
                handle: "abc".into(),
                public_tls_port: 4994,
                public_udp_port: 4993,
                hole_punch_port: Some(21000),
            },
        );

        let plan = engine.plan(&target).unwrap();
        assert_eq!(plan.peer.port(), 21000);
        assert_eq!(plan.source.map(|s| s.port()), Some(21000));
        assert!(plan.secure);
    }

    #[test]
    fn wan_plan_without_hole_punch_uses_public_tls_port() {
        let engine = ConnectionEngine::new(EngineConfig::default(), Delegates::default()).unwrap();
        let target = ConnectTarget::wan(
            "1234-5678",
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)),
            WanParams {
                handle: "abc".into(),
                public_tls_port: 4994,
                public_udp_port: 4993,
                hole_punch_port: None,
            },
        );

        let plan = engine.plan(&target).unwrap();
        assert_eq!(plan.peer.port(), 4994);
        assert_eq!(plan.source, None);
        assert!(plan.secure);
    }
}
