//! Scoped lifecycle guard
//!
//! Teardown runs exactly once when the guard goes out of scope, whether
//! the scope ends normally, through an error, or because the owning future
//! was cancelled. It suppresses further reconnection, cancels a pending
//! attempt and closes the live session; both streams end after draining.

use crate::core::config::ConnectionConfig;
use crate::core::controller::{Controller, ReconnectingSocket};
use crate::traits::{Result, Transport};
use std::future::Future;
use std::sync::Arc;

/// Releases a connection when dropped
pub(crate) struct LifecycleGuard {
    controller: Arc<Controller>,
}

impl LifecycleGuard {
    pub(crate) fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        self.controller.teardown();
    }
}

/// Run `body` with a connected socket, releasing it when `body` finishes
///
/// The connection is released even if `body` fails or the returned future
/// is dropped before completing.
///
/// # Example
///
/// ```ignore
/// let config = ConnectionConfig::new("ws://localhost:9001");
/// let greeting = with_connection(config, TungsteniteTransport::new(), |socket| async move {
///     socket.send("hello")?;
///     let mut messages = socket.messages();
///     Ok(messages.next().await)
/// })
/// .await?;
/// ```
pub async fn with_connection<T, F, Fut, R>(
    config: ConnectionConfig,
    transport: T,
    body: F,
) -> Result<R>
where
    T: Transport,
    F: FnOnce(Arc<ReconnectingSocket>) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let socket = Arc::new(ReconnectingSocket::connect(config, transport).await?);
    let outcome = body(Arc::clone(&socket)).await;

    // A clone kept by `body` would otherwise hold the connection open
    socket.shutdown();
    outcome
}
