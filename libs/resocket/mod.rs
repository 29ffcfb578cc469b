//! # resocket
//!
//! A WebSocket client connection that survives transient network failure.
//!
//! ## Features
//!
//! - **Automatic reconnection**: exponential backoff with optional jitter
//!   and an attempt limit
//! - **Ordered streams**: messages and lifecycle events arrive as two
//!   independent async streams, continuous across reconnects
//! - **Scoped lifetime**: dropping the socket closes the connection and
//!   ends both streams
//! - **Pluggable transport**: [`Transport`] is the only seam; a
//!   tokio-tungstenite implementation is included
//!
//! ## Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use resocket::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConnectionConfig::new("wss://api.example.com/ws")
//!         .with_reconnection(ReconnectionPolicy::enabled().with_max_attempts(5));
//!
//!     let socket = ReconnectingSocket::connect(config, TungsteniteTransport::new()).await?;
//!     socket.send("hello")?;
//!
//!     let mut events = socket.events();
//!     while let Some(event) = events.next().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod traits;
pub mod transport;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    backoff,
    config::{ConnectionConfig, ReconnectionPolicy},
    connection_state::{ConnectionState, Metrics},
    controller::{ControllerPhase, ReconnectingSocket, ReconnectionStatus},
    event::LifecycleEvent,
    guard::with_connection,
};

pub use crate::transport::TungsteniteTransport;
