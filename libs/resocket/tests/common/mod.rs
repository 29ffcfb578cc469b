//! Common test utilities for resocket integration tests
//!
//! - [`MockTransport`]: an in-process transport whose connections the test
//!   drives by hand (open, deliver, drop)
//! - [`MockWsServer`]: a real tokio-tungstenite echo server on localhost

#![allow(dead_code)]

use parking_lot::Mutex;
use resocket::core::connection_state::{AtomicConnectionState, ConnectionState};
use resocket::{Result, SocketError, Transport, TransportHandle, TransportListener, WsMessage};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the next dial does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dial {
    /// Open shortly after the handle is returned
    Open,
    /// Fail synchronously inside `open`
    Fail,
    /// Close with 1006 before ever opening
    Refuse,
    /// Stay connecting until closed
    Hang,
}

/// One connection created by [`MockTransport`]
pub struct MockConnection {
    state: AtomicConnectionState,
    listener: Arc<dyn TransportListener>,
    sent: Mutex<Vec<WsMessage>>,
    // Serializes callbacks for this connection
    callbacks: Mutex<()>,
}

impl MockConnection {
    fn new(listener: Arc<dyn TransportListener>) -> Self {
        Self {
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            listener,
            sent: Mutex::new(Vec::new()),
            callbacks: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn sent(&self) -> Vec<WsMessage> {
        self.sent.lock().clone()
    }

    pub fn open(&self) {
        let _serial = self.callbacks.lock();
        if self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Open)
        {
            self.listener.on_open();
        }
    }

    /// Deliver a payload as if the peer sent it
    pub fn receive(&self, payload: impl Into<WsMessage>) {
        let _serial = self.callbacks.lock();
        self.listener.on_message(payload.into());
    }

    pub fn fail(&self, reason: &str) {
        let _serial = self.callbacks.lock();
        self.listener.on_error(reason.to_string());
    }

    /// Close from the peer side
    pub fn drop_connection(&self, code: u16, reason: &str) {
        let _serial = self.callbacks.lock();
        self.state.set(ConnectionState::Closed);
        self.listener.on_close(code, reason.to_string());
    }

    /// Flip the state to `Closed` without raising `on_close` yet
    pub fn mark_closed(&self) {
        self.state.set(ConnectionState::Closed);
    }

    /// Raise `on_close` for a connection already marked closed
    pub fn report_close(&self, code: u16, reason: &str) {
        let _serial = self.callbacks.lock();
        self.listener.on_close(code, reason.to_string());
    }
}

struct MockHandle {
    connection: Arc<MockConnection>,
    close_delay: Option<Duration>,
}

impl TransportHandle for MockHandle {
    fn send(&self, payload: WsMessage) -> Result<()> {
        if self.connection.state() != ConnectionState::Open {
            return Err(SocketError::Transport("not open".to_string()));
        }
        self.connection.sent.lock().push(payload);
        Ok(())
    }

    /// Closes immediately and raises `on_close` before returning, unless
    /// the transport was given a close delay
    fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        let current = self.connection.state();
        if !current.is_active() {
            return Ok(());
        }

        let code = code.unwrap_or(1000);
        let reason = reason.unwrap_or_default();
        match self.close_delay {
            None => self.connection.drop_connection(code, &reason),
            Some(delay) => {
                self.connection
                    .state
                    .transition(current, ConnectionState::Closing);
                let connection = Arc::clone(&self.connection);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    connection.drop_connection(code, &reason);
                });
            }
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

#[derive(Default)]
struct MockInner {
    plan: Mutex<VecDeque<Dial>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    dials: Mutex<Vec<String>>,
    close_delay: Mutex<Option<Duration>>,
}

/// Scriptable in-process transport
///
/// Each dial consumes the next entry of the plan; once the plan is empty
/// every dial opens.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new(plan: impl IntoIterator<Item = Dial>) -> Self {
        let transport = Self::default();
        transport.inner.plan.lock().extend(plan);
        transport
    }

    /// Make every handle finish closing `delay` after `close` returns
    pub fn with_close_delay(self, delay: Duration) -> Self {
        *self.inner.close_delay.lock() = Some(delay);
        self
    }

    /// Number of times `open` was called
    pub fn dial_count(&self) -> usize {
        self.inner.dials.lock().len()
    }

    pub fn dialed_addresses(&self) -> Vec<String> {
        self.inner.dials.lock().clone()
    }

    /// Connections in creation order; failed synchronous dials create none
    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        Arc::clone(&self.inner.connections.lock()[index])
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        address: &str,
        _protocols: &[String],
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>> {
        self.inner.dials.lock().push(address.to_string());
        let dial = self.inner.plan.lock().pop_front().unwrap_or(Dial::Open);

        if dial == Dial::Fail {
            return Err(SocketError::Dial {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let connection = Arc::new(MockConnection::new(listener));
        self.inner.connections.lock().push(Arc::clone(&connection));

        // Callbacks never fire before `open` returns
        match dial {
            Dial::Open => {
                let connection = Arc::clone(&connection);
                tokio::spawn(async move { connection.open() });
            }
            Dial::Refuse => {
                let connection = Arc::clone(&connection);
                tokio::spawn(async move { connection.drop_connection(1006, "refused") });
            }
            Dial::Hang | Dial::Fail => {}
        }

        Ok(Box::new(MockHandle {
            connection,
            close_delay: *self.inner.close_delay.lock(),
        }))
    }
}

/// A simple WebSocket echo server for testing
///
/// [`close_all`](Self::close_all) makes every live connection send a close
/// frame with the given code and reason.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    closer: broadcast::Sender<(u16, String)>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();
        let (closer, _) = broadcast::channel(16);
        let closer_clone = closer.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let close_rx = closer_clone.subscribe();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, close_rx).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            closer,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut close_rx: broadcast::Receiver<(u16, String)>,
    ) {
        use futures::{SinkExt, StreamExt};
        use std::borrow::Cow;
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let mut closing = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            // Close replies are flushed by the next read
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                command = close_rx.recv(), if !closing => {
                    if let Ok((code, reason)) = command {
                        closing = true;
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason),
                        };
                        if write.send(Message::Close(Some(frame))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Close every live connection from the server side
    pub fn close_all(&self, code: u16, reason: &str) {
        let _ = self.closer.send((code, reason.to_string()));
    }

    /// Stop accepting new connections
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Address on localhost with nothing listening
pub async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}
