//! One physical transport handle and its callback wiring
//!
//! A session turns the transport's four push-style callbacks into pushes
//! on the two shared channels:
//!
//! ```text
//! on_open     ──> observer.session_opened ──> Opened
//! on_close    ──> Closed{code, reason}    ──> observer.session_closed
//! on_error    ──> Errored{reason}
//! on_message  ──> message channel         ──> MessageReceived{payload}
//! ```
//!
//! Every callback runs under the listener's attachment lock, so once
//! [`ConnectionSession::detach`] returns no straggling callback of this
//! session can write to the channels or reach the controller.

use crate::core::channel::OrderedChannel;
use crate::core::connection_state::{AtomicMetrics, ConnectionState};
use crate::core::event::LifecycleEvent;
use crate::traits::{Result, SocketError, Transport, TransportHandle, TransportListener, WsMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Receives lifecycle signals from the sessions it owns
///
/// Called while the session's attachment lock is held; implementations
/// must not call back into the same session.
pub trait SessionObserver: Send + Sync {
    /// Session `id` finished opening; a new healthy era begins
    ///
    /// Returning `false` rejects the connection: the owner was closed while
    /// the dial was in flight. The session then closes itself instead of
    /// announcing `Opened`.
    fn session_opened(&self, id: u64) -> bool;

    /// Session `id` closed
    fn session_closed(&self, id: u64);
}

/// Where a session delivers what its transport raises
#[derive(Clone)]
pub struct SessionWiring {
    pub messages: OrderedChannel<WsMessage>,
    pub events: OrderedChannel<LifecycleEvent>,
    pub metrics: Arc<AtomicMetrics>,
    pub observer: Option<Weak<dyn SessionObserver>>,
}

impl SessionWiring {
    /// Wiring into fresh channels with no observer
    pub fn standalone() -> Self {
        Self {
            messages: OrderedChannel::new(),
            events: OrderedChannel::new(),
            metrics: Arc::new(AtomicMetrics::new()),
            observer: None,
        }
    }
}

/// Resolves once the session opens, or with the reason it never did
pub type OpenSignal = oneshot::Receiver<Result<()>>;

struct SessionListener {
    id: u64,
    attached: Mutex<bool>,
    // Set once a closure has been pushed, before the observer hears of it
    close_reported: AtomicBool,
    opened: Mutex<Option<oneshot::Sender<Result<()>>>>,
    handle: Mutex<Option<Weak<dyn TransportHandle>>>,
    wiring: SessionWiring,
}

enum Owner {
    Alive(Arc<dyn SessionObserver>),
    Gone,
    None,
}

impl SessionListener {
    fn owner(&self) -> Owner {
        match &self.wiring.observer {
            Some(weak) => weak.upgrade().map_or(Owner::Gone, Owner::Alive),
            None => Owner::None,
        }
    }

    /// Close the handle off the callback path
    ///
    /// The transport may raise `on_close` synchronously from `close`, which
    /// would re-enter the attachment lock held by the caller.
    fn abandon(&self) {
        let handle = self.handle.lock().as_ref().and_then(Weak::upgrade);
        let Some(handle) = handle else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let id = self.id;
                runtime.spawn(async move {
                    if let Err(e) = handle.close(None, Some("connection abandoned".to_string())) {
                        warn!(session = id, "Failed to close abandoned session: {}", e);
                    }
                });
            }
            Err(_) => warn!(session = self.id, "No runtime available to close abandoned session"),
        }
    }

    fn resolve_open(&self, outcome: Result<()>) {
        if let Some(tx) = self.opened.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl TransportListener for SessionListener {
    fn on_open(&self) {
        let attached = self.attached.lock();
        if !*attached {
            return;
        }

        let keep = match self.owner() {
            Owner::Alive(observer) => observer.session_opened(self.id),
            Owner::Gone => false,
            Owner::None => true,
        };

        if !keep {
            debug!(session = self.id, "Session opened after its owner closed, abandoning");
            self.resolve_open(Err(SocketError::ConnectionClosed(
                "owner closed during dial".to_string(),
            )));
            self.abandon();
            return;
        }

        debug!(session = self.id, "Session opened");
        self.wiring.events.push(LifecycleEvent::Opened);
        self.resolve_open(Ok(()));
    }

    fn on_close(&self, code: u16, reason: String) {
        let attached = self.attached.lock();
        if !*attached {
            return;
        }

        debug!(session = self.id, code, %reason, "Session closed");
        self.resolve_open(Err(SocketError::ConnectionClosed(format!(
            "closed before opening (code {}): {}",
            code, reason
        ))));
        self.wiring.events.push(LifecycleEvent::Closed { code, reason });
        self.close_reported.store(true, Ordering::SeqCst);
        match self.owner() {
            Owner::Alive(observer) => observer.session_closed(self.id),
            // Nobody is left to end the streams
            Owner::Gone => {
                self.wiring.messages.close();
                self.wiring.events.close();
            }
            Owner::None => {}
        }
    }

    fn on_error(&self, reason: String) {
        let attached = self.attached.lock();
        if !*attached {
            return;
        }

        warn!(session = self.id, %reason, "Transport error");
        self.wiring.events.push(LifecycleEvent::Errored { reason });
    }

    fn on_message(&self, payload: WsMessage) {
        let attached = self.attached.lock();
        if !*attached {
            return;
        }

        self.wiring.metrics.increment_received();
        self.wiring.messages.push(payload.clone());
        self.wiring.events.push(LifecycleEvent::MessageReceived { payload });
    }
}

/// One transport handle wired into the shared channels
///
/// Cheap to clone; clones share the same handle and wiring.
#[derive(Clone)]
pub struct ConnectionSession {
    handle: Arc<dyn TransportHandle>,
    listener: Arc<SessionListener>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.listener.id)
            .field("state", &self.handle.state())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ConnectionSession {
    /// Open a transport handle and wire its callbacks
    ///
    /// Fails only if the transport raises a fault synchronously. The
    /// returned signal resolves when the connection opens or closes first.
    pub fn open<T>(
        transport: &T,
        address: &str,
        protocols: &[String],
        wiring: SessionWiring,
    ) -> Result<(Self, OpenSignal)>
    where
        T: Transport + ?Sized,
    {
        let (opened_tx, opened_rx) = oneshot::channel();
        let listener = Arc::new(SessionListener {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            attached: Mutex::new(true),
            close_reported: AtomicBool::new(false),
            opened: Mutex::new(Some(opened_tx)),
            handle: Mutex::new(None),
            wiring,
        });

        let callbacks: Arc<dyn TransportListener> = listener.clone();
        let handle: Arc<dyn TransportHandle> = Arc::from(transport.open(address, protocols, callbacks)?);
        *listener.handle.lock() = Some(Arc::downgrade(&handle));
        debug!(session = listener.id, address, "Session created");

        Ok((Self { handle, listener }, opened_rx))
    }

    /// Process-unique identifier of this session
    pub fn id(&self) -> u64 {
        self.listener.id
    }

    /// Hand a message to the transport
    ///
    /// Never queued: sending while not open is an error.
    pub fn send(&self, message: WsMessage) -> Result<()> {
        let state = self.handle.state();
        if state != ConnectionState::Open {
            return Err(SocketError::SendFailed(format!("connection is {}", state)));
        }

        self.handle
            .send(message)
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    /// Request the transport to close
    ///
    /// Closing an already-closed session succeeds without doing anything.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        if self.handle.state() == ConnectionState::Closed {
            return Ok(());
        }

        self.handle
            .close(code, reason)
            .map_err(|e| SocketError::CloseFailed(e.to_string()))
    }

    /// The transport's current state
    #[inline]
    pub fn ready_state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Stop forwarding callbacks
    ///
    /// Waits for an in-progress callback to finish. Pending open signals
    /// resolve as closed.
    pub fn detach(&self) {
        let mut attached = self.listener.attached.lock();
        if *attached {
            *attached = false;
            debug!(session = self.listener.id, "Session detached");
        }
        drop(attached);
        self.listener.resolve_open(Err(SocketError::ConnectionClosed(
            "session detached".to_string(),
        )));
    }

    pub fn is_attached(&self) -> bool {
        *self.listener.attached.lock()
    }

    /// Whether this session is done writing to the channels
    ///
    /// `true` once it was detached or once its closure reached the event
    /// channel. The transport's own state is not enough: it may read
    /// `Closed` before `on_close` has run.
    pub fn is_settled(&self) -> bool {
        self.listener.close_reported.load(Ordering::SeqCst) || !self.is_attached()
    }
}
