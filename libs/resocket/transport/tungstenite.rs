//! tokio-tungstenite transport
//!
//! Each handle owns one spawned connection task. The handle talks to it
//! over an unbounded command channel; the task raises listener callbacks
//! from its own timeline, one at a time.

use crate::core::connection_state::{AtomicConnectionState, ConnectionState};
use crate::traits::{Result, SocketError, Transport, TransportHandle, TransportListener, WsMessage};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Close code reported when the connection ended without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code used when the caller gives none
pub const NORMAL_CLOSURE: u16 = 1000;

/// How long to wait for the peer to answer our close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

enum Command {
    Send(Message),
    Close(Option<CloseFrame<'static>>),
}

/// [`Transport`] backed by tokio-tungstenite
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport {
    _private: (),
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for TungsteniteTransport {
    fn open(
        &self,
        address: &str,
        protocols: &[String],
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>> {
        let request = build_request(address, protocols)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| SocketError::Dial {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Connecting));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        debug!("Dialing {}", address);
        runtime.spawn(run_connection(
            address.to_string(),
            request,
            Arc::clone(&state),
            command_rx,
            listener,
        ));

        Ok(Box::new(TungsteniteHandle {
            state,
            commands: command_tx,
        }))
    }
}

/// Parse the address and attach the requested subprotocols
fn build_request(address: &str, protocols: &[String]) -> Result<Request> {
    let dial_fault = |reason: String| SocketError::Dial {
        address: address.to_string(),
        reason,
    };

    let mut request = address
        .into_client_request()
        .map_err(|e| dial_fault(e.to_string()))?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| dial_fault(format!("invalid protocol list: {}", e)))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    Ok(request)
}

/// Handle to one tungstenite connection
///
/// Dropping the handle closes the connection.
pub struct TungsteniteHandle {
    state: Arc<AtomicConnectionState>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportHandle for TungsteniteHandle {
    fn send(&self, payload: WsMessage) -> Result<()> {
        if !self.state.is_open() {
            return Err(SocketError::Transport(format!(
                "connection is {}",
                self.state.get()
            )));
        }

        self.commands
            .send(Command::Send(to_tungstenite(payload)))
            .map_err(|_| SocketError::Transport("connection task has ended".to_string()))
    }

    fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        let current = self.state.get();
        if !current.is_active() {
            return Ok(());
        }

        let frame = match (code, reason) {
            (None, None) => None,
            (code, reason) => Some(CloseFrame {
                code: CloseCode::from(code.unwrap_or(NORMAL_CLOSURE)),
                reason: Cow::Owned(reason.unwrap_or_default()),
            }),
        };

        self.state.transition(current, ConnectionState::Closing);
        self.commands
            .send(Command::Close(frame))
            .map_err(|_| SocketError::Transport("connection task has ended".to_string()))
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

/// Drive one connection from dial to close
///
/// `on_close` is raised exactly once, as the last callback.
async fn run_connection(
    address: String,
    request: Request,
    state: Arc<AtomicConnectionState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    listener: Arc<dyn TransportListener>,
) {
    let connected = tokio::select! {
        result = connect_async(request) => result,
        command = commands.recv() => {
            // Nothing can be sent before open, so this is a close request
            let (code, reason) = match command {
                Some(Command::Close(Some(frame))) => close_parts(Some(&frame)),
                _ => (NORMAL_CLOSURE, "closed while connecting".to_string()),
            };
            debug!("Dial to {} cancelled", address);
            state.set(ConnectionState::Closed);
            listener.on_close(code, reason);
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", address, e);
            state.set(ConnectionState::Closed);
            listener.on_error(e.to_string());
            listener.on_close(ABNORMAL_CLOSURE, e.to_string());
            return;
        }
    };

    // A close requested mid-handshake wins over the open
    if !state.transition(ConnectionState::Connecting, ConnectionState::Open) {
        drop(ws_stream);
        state.set(ConnectionState::Closed);
        listener.on_close(NORMAL_CLOSURE, "closed while connecting".to_string());
        return;
    }

    info!("Connected to {}", address);
    listener.on_open();

    let (mut write, mut read) = ws_stream.split();
    let mut received_close: Option<(u16, String)> = None;
    let mut sent_close: Option<(u16, String)> = None;
    let mut commands_open = true;
    let close_deadline = tokio::time::sleep(Duration::MAX);
    tokio::pin!(close_deadline);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => listener.on_message(WsMessage::Text(text)),
                    Some(Ok(Message::Binary(data))) => listener.on_message(WsMessage::Binary(data)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Close frame received from {}", address);
                        state.set(ConnectionState::Closing);
                        received_close = Some(close_parts(frame.as_ref()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) if sent_close.is_some() || received_close.is_some() => {
                        debug!("Connection to {} ended during close: {}", address, e);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", address, e);
                        listener.on_error(e.to_string());
                        break;
                    }
                    None => break,
                }
            }

            command = commands.recv(), if commands_open => {
                let frame = match command {
                    Some(Command::Send(msg)) => {
                        if let Err(e) = write.send(msg).await {
                            warn!("Failed to write to {}: {}", address, e);
                            listener.on_error(e.to_string());
                        }
                        continue;
                    }
                    Some(Command::Close(frame)) => frame,
                    None => {
                        debug!("Handle for {} dropped", address);
                        commands_open = false;
                        None
                    }
                };

                if sent_close.is_none() {
                    debug!("Closing connection to {}", address);
                    state.set(ConnectionState::Closing);
                    sent_close = Some(close_parts(frame.as_ref()));
                    // Failure here surfaces as a read error or the deadline
                    if let Err(e) = write.send(Message::Close(frame)).await {
                        debug!("Failed to send close frame to {}: {}", address, e);
                    }
                    close_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + CLOSE_GRACE);
                }
            }

            _ = &mut close_deadline, if sent_close.is_some() => {
                warn!("Peer {} did not answer close within {:?}", address, CLOSE_GRACE);
                break;
            }
        }
    }

    let (code, reason) = received_close
        .or(sent_close)
        .unwrap_or_else(|| (ABNORMAL_CLOSURE, "connection lost".to_string()));

    info!("Connection to {} closed (code {})", address, code);
    state.set(ConnectionState::Closed);
    listener.on_close(code, reason);
}

fn close_parts(frame: Option<&CloseFrame<'_>>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
        None => (NORMAL_CLOSURE, String::new()),
    }
}

fn to_tungstenite(payload: WsMessage) -> Message {
    match payload {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
