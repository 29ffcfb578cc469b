//! # resocket traits
//!
//! Collaborator seams for the reconnecting-connection core:
//!
//! - **SocketError**: the single error type and `Result` alias
//! - **WsMessage**: opaque text/binary payload
//! - **Transport**: the socket implementation the core drives, with its
//!   handle and callback-listener contracts
//!
//! ## Example
//!
//! ```rust,ignore
//! use resocket::traits::*;
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn open(
//!         &self,
//!         address: &str,
//!         protocols: &[String],
//!         listener: Arc<dyn TransportListener>,
//!     ) -> Result<Box<dyn TransportHandle>> {
//!         // create the socket, raise listener.on_open() once connected
//!     }
//! }
//! ```

pub mod error;
pub mod message;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, SocketError};
pub use message::WsMessage;
pub use transport::{Transport, TransportHandle, TransportListener};
