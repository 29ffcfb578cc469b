//! # Reconnecting-connection core
//!
//! ```text
//! ReconnectingSocket ──owns──> Controller ──swaps──> ConnectionSession ──> TransportHandle
//!        │                        │                         │
//!        └──> LifecycleGuard      └──> backoff::delay       └──pushes──> OrderedChannel × 2
//! ```
//!
//! The controller outlives every session it creates. Sessions are replaced
//! on each reconnect; the two channels are not, so consumers see one
//! continuous message stream and one continuous event stream.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod connection_state;
pub mod controller;
pub mod event;
pub mod guard;
pub mod session;

// Re-export main types
pub use channel::OrderedChannel;
pub use config::{ConnectionConfig, ReconnectionPolicy};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use controller::{ControllerPhase, ReconnectingSocket, ReconnectionStatus};
pub use event::LifecycleEvent;
pub use guard::with_connection;
pub use session::{ConnectionSession, OpenSignal, SessionObserver, SessionWiring};
