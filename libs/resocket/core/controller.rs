use crate::core::backoff;
use crate::core::channel::OrderedChannel;
use crate::core::config::ConnectionConfig;
use crate::core::connection_state::{AtomicMetrics, ConnectionState, Metrics};
use crate::core::event::LifecycleEvent;
use crate::core::guard::LifecycleGuard;
use crate::core::session::{ConnectionSession, SessionObserver, SessionWiring};
use crate::traits::{Result, SocketError, Transport, WsMessage};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Logical state of the reconnection controller
///
/// Layered on top of the transport's [`ConnectionState`]; `Terminated` is
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// First dial in flight
    Initializing,
    /// A session is open, or closed with no decision taken yet
    Live,
    /// Waiting out a backoff delay or dialing a replacement
    Reconnecting,
    /// Closed for good
    Terminated,
}

/// Reconnection bookkeeping, reset on every successful open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectionStatus {
    pub is_reconnecting: bool,
    pub attempt_count: u32,
}

struct ControllerState {
    phase: ControllerPhase,
    manual_close: bool,
    torn_down: bool,
    status: ReconnectionStatus,
    current: Option<ConnectionSession>,
    pending: Option<AbortHandle>,
}

/// Long-lived owner of the channels and the swappable session slot
pub(crate) struct Controller {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    messages: OrderedChannel<WsMessage>,
    events: OrderedChannel<LifecycleEvent>,
    metrics: Arc<AtomicMetrics>,
    runtime: Handle,
    state: Mutex<ControllerState>,
    self_ref: Weak<Controller>,
}

impl Controller {
    fn new(config: ConnectionConfig, transport: Arc<dyn Transport>, runtime: Handle) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            transport,
            messages: OrderedChannel::new(),
            events: OrderedChannel::new(),
            metrics: Arc::new(AtomicMetrics::new()),
            runtime,
            state: Mutex::new(ControllerState {
                phase: ControllerPhase::Initializing,
                manual_close: false,
                torn_down: false,
                status: ReconnectionStatus::default(),
                current: None,
                pending: None,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Open a new session in place of the current one and wait for it
    ///
    /// The previous session is detached before the new one is wired, so
    /// nothing it raises afterwards reaches the shared channels.
    async fn dial(&self) -> Result<()> {
        let previous = self.state.lock().current.take();
        if let Some(previous) = previous {
            previous.detach();
        }

        let observer: Weak<dyn SessionObserver> = self.self_ref.clone();
        let wiring = SessionWiring {
            messages: self.messages.clone(),
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
            observer: Some(observer),
        };

        let (session, opened) = ConnectionSession::open(
            &*self.transport,
            self.config.address(),
            self.config.protocols(),
            wiring,
        )?;

        {
            let mut state = self.state.lock();
            if state.manual_close {
                drop(state);
                session.detach();
                let _ = session.close(None, None);
                return Err(SocketError::ConnectionClosed("closed by caller".to_string()));
            }
            state.current = Some(session.clone());
        }

        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, opened).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SocketError::ConnectionClosed(
                "open signal dropped".to_string(),
            )),
            Err(_) => {
                warn!(session = session.id(), "Connect timed out after {:?}", timeout);
                session.detach();
                {
                    let mut state = self.state.lock();
                    if state.current.as_ref().map(ConnectionSession::id) == Some(session.id()) {
                        state.current = None;
                    }
                }
                if let Err(e) = session.close(None, Some("connect timeout".to_string())) {
                    warn!(session = session.id(), "Failed to close timed out session: {}", e);
                }
                Err(SocketError::ConnectTimeout(timeout))
            }
        }
    }

    /// Start the reconnection cycle unless one is already running
    fn begin_reconnect(&self, state: &mut ControllerState) {
        if state.status.is_reconnecting {
            debug!("Reconnection already in progress, ignoring");
            return;
        }

        let Some(this) = self.self_ref.upgrade() else {
            return;
        };

        state.status.is_reconnecting = true;
        state.phase = ControllerPhase::Reconnecting;
        let task = self.runtime.spawn(async move { this.reconnect_loop().await });
        state.pending = Some(task.abort_handle());
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            let (attempt, delay) = {
                let mut state = self.state.lock();
                if state.manual_close {
                    return;
                }

                let policy = self.config.reconnection();
                if policy.is_exhausted(state.status.attempt_count) {
                    let attempt = state.status.attempt_count;
                    state.phase = ControllerPhase::Terminated;
                    state.status.is_reconnecting = false;
                    state.pending = None;
                    self.events.push(LifecycleEvent::ReconnectFailed { attempt });
                    drop(state);

                    error!("Reconnection failed after {} attempts, giving up", attempt);
                    self.finish();
                    return;
                }

                state.status.attempt_count += 1;
                let attempt = state.status.attempt_count;
                let delay = backoff::delay(attempt, policy);
                self.events.push(LifecycleEvent::Reconnecting { attempt });
                (attempt, delay)
            };

            info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::time::sleep(delay).await;

            match self.dial().await {
                Ok(()) => {
                    info!("Reconnected to {} (attempt {})", self.config.address(), attempt);
                    return;
                }
                Err(e) => {
                    warn!("Reconnection attempt {} failed: {}", attempt, e);
                }
            }
        }
    }

    /// End both consumer streams once everything queued is drained
    fn finish(&self) {
        if !self.events.is_closed() {
            debug!("Closing message and event channels");
        }
        self.messages.close();
        self.events.close();
    }

    pub(crate) fn send(&self, message: WsMessage) -> Result<()> {
        let session = self.state.lock().current.clone();
        let Some(session) = session else {
            return Err(SocketError::SendFailed("no active connection".to_string()));
        };

        session.send(message)?;
        self.metrics.increment_sent();
        Ok(())
    }

    /// Enter `Terminated` and request the live transport to close
    pub(crate) fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        let (pending, session) = {
            let mut state = self.state.lock();
            state.manual_close = true;
            state.phase = ControllerPhase::Terminated;
            state.status.is_reconnecting = false;
            (state.pending.take(), state.current.clone())
        };

        if let Some(pending) = pending {
            debug!("Cancelling pending reconnection");
            pending.abort();
        }

        match session {
            Some(session) if !session.is_settled() => {
                info!("Closing connection to {}", self.config.address());
                // The transport's close notification ends the streams
                session.close(code, reason).inspect_err(|_| self.finish())
            }
            _ => {
                self.finish();
                Ok(())
            }
        }
    }

    /// Release everything, exactly once
    pub(crate) fn teardown(&self) {
        let (pending, session) = {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.manual_close = true;
            state.phase = ControllerPhase::Terminated;
            state.status.is_reconnecting = false;
            (state.pending.take(), state.current.clone())
        };

        debug!("Tearing down connection to {}", self.config.address());

        if let Some(pending) = pending {
            pending.abort();
        }

        match session {
            // Its close notification finishes the streams
            Some(session) if !session.is_settled() => {
                if let Err(e) = session.close(None, None) {
                    warn!("Failed to close connection during teardown: {}", e);
                    self.finish();
                }
            }
            _ => self.finish(),
        }
    }

    pub(crate) fn ready_state(&self) -> ConnectionState {
        self.state
            .lock()
            .current
            .as_ref()
            .map_or(ConnectionState::Closed, ConnectionSession::ready_state)
    }

    pub(crate) fn phase(&self) -> ControllerPhase {
        self.state.lock().phase
    }

    pub(crate) fn reconnection_status(&self) -> ReconnectionStatus {
        self.state.lock().status
    }

    pub(crate) fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.metrics.messages_sent(),
            messages_received: self.metrics.messages_received(),
            reconnect_count: self.metrics.reconnect_count(),
            connection_state: self.ready_state(),
        }
    }
}

impl SessionObserver for Controller {
    fn session_opened(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        if state.manual_close {
            return false;
        }

        if state.phase == ControllerPhase::Reconnecting {
            self.metrics.increment_reconnects();
        }
        debug!(session = id, "Connection healthy, resetting reconnection status");
        state.status = ReconnectionStatus::default();
        state.phase = ControllerPhase::Live;
        true
    }

    fn session_closed(&self, id: u64) {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            // The dial waiting on this session reports the failure itself
            ControllerPhase::Initializing | ControllerPhase::Reconnecting => {
                debug!(session = id, "Session closed during dial");
            }
            ControllerPhase::Terminated => {
                drop(state);
                self.finish();
            }
            ControllerPhase::Live if !self.config.reconnection().enabled => {
                state.phase = ControllerPhase::Terminated;
                drop(state);
                info!("Connection to {} closed, reconnection disabled", self.config.address());
                self.finish();
            }
            ControllerPhase::Live => {
                warn!("Connection to {} lost", self.config.address());
                self.begin_reconnect(&mut state);
            }
        }
    }
}

/// A connection that re-establishes itself after unexpected drops
///
/// Consumers read two ordered streams that stay continuous across
/// reconnects: [`messages`](Self::messages) carries payloads,
/// [`events`](Self::events) carries [`LifecycleEvent`]s. Dropping the socket
/// tears the connection down.
///
/// # Example
///
/// ```ignore
/// let config = ConnectionConfig::new("wss://api.example.com/ws")
///     .with_reconnection(ReconnectionPolicy::enabled());
/// let socket = ReconnectingSocket::connect(config, TungsteniteTransport::new()).await?;
///
/// let mut events = socket.events();
/// socket.send(WsMessage::Text("subscribe".into()))?;
/// while let Some(event) = events.next().await {
///     println!("{:?}", event);
/// }
/// ```
pub struct ReconnectingSocket {
    controller: Arc<Controller>,
    _guard: LifecycleGuard,
}

impl ReconnectingSocket {
    /// Open the first connection
    ///
    /// Fails if the first dial fails, even when reconnection is enabled;
    /// the policy only covers drops after the connection was established.
    pub async fn connect<T>(config: ConnectionConfig, transport: T) -> Result<Self>
    where
        T: Transport,
    {
        config.validate()?;

        let controller = Controller::new(config, Arc::new(transport), Handle::current());
        // Dropped on failure or cancellation, which closes the in-flight session
        let guard = LifecycleGuard::new(Arc::clone(&controller));

        if let Err(e) = controller.dial().await {
            error!("Failed to connect to {}: {}", controller.config.address(), e);
            return Err(e);
        }

        info!("Connected to {}", controller.config.address());
        Ok(Self {
            controller,
            _guard: guard,
        })
    }

    /// Send a message through the live connection
    ///
    /// Fails with [`SocketError::SendFailed`] while not open; nothing is
    /// queued for later.
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<()> {
        self.controller.send(message.into())
    }

    /// Close the connection and stop reconnecting
    pub fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        self.controller.close(code, reason)
    }

    /// Current state of the live transport
    #[inline]
    pub fn ready_state(&self) -> ConnectionState {
        self.controller.ready_state()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.ready_state() == ConnectionState::Open
    }

    pub fn phase(&self) -> ControllerPhase {
        self.controller.phase()
    }

    pub fn reconnection_status(&self) -> ReconnectionStatus {
        self.controller.reconnection_status()
    }

    pub fn metrics(&self) -> Metrics {
        self.controller.metrics()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.controller.config
    }

    /// Stream of received payloads
    pub fn messages(&self) -> BoxStream<'static, WsMessage> {
        self.controller.messages.subscribe()
    }

    /// Stream of lifecycle events
    pub fn events(&self) -> BoxStream<'static, LifecycleEvent> {
        self.controller.events.subscribe()
    }

    /// Release the connection now instead of at drop
    ///
    /// Runs the same teardown as dropping the socket; later calls and the
    /// eventual drop do nothing more.
    pub fn shutdown(&self) {
        self.controller.teardown();
    }
}

impl std::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("address", &self.controller.config.address())
            .field("phase", &self.phase())
            .field("state", &self.ready_state())
            .finish()
    }
}
