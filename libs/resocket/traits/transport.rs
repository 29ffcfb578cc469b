use crate::core::connection_state::ConnectionState;
use super::error::Result;
use super::message::WsMessage;
use std::sync::Arc;

/// Callback slots a transport raises for one handle
///
/// The transport guarantees that callbacks for the same handle are never
/// invoked concurrently, and that `on_close` eventually follows `on_open`
/// unless the process terminates first. Callbacks may be raised
/// synchronously from inside [`TransportHandle::close`].
pub trait TransportListener: Send + Sync {
    /// The connection finished opening
    fn on_open(&self);

    /// The connection closed with the given close code and reason
    fn on_close(&self, code: u16, reason: String);

    /// The transport reported a fault
    ///
    /// A fault does not imply the connection is closed; `on_close` is
    /// raised separately.
    fn on_error(&self, reason: String);

    /// A payload arrived
    fn on_message(&self, payload: WsMessage);
}

/// One physical connection created by a [`Transport`]
pub trait TransportHandle: Send + Sync {
    /// Hand a payload to the transport
    fn send(&self, payload: WsMessage) -> Result<()>;

    /// Request the connection to close
    fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()>;

    /// The transport's current reported state
    fn state(&self) -> ConnectionState;
}

/// Factory for transport handles
///
/// `open` returns as soon as the handle exists; the connection completes
/// asynchronously and reports through the listener. A fault raised here
/// (for example an unparseable address) means no handle was created and
/// no callback will ever fire.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        address: &str,
        protocols: &[String],
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(
        &self,
        address: &str,
        protocols: &[String],
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn TransportHandle>> {
        (**self).open(address, protocols, listener)
    }
}

impl<H: TransportHandle + ?Sized> TransportHandle for Arc<H> {
    fn send(&self, payload: WsMessage) -> Result<()> {
        (**self).send(payload)
    }

    fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        (**self).close(code, reason)
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }
}
