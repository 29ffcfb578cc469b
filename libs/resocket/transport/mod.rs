//! Transport implementations

pub mod tungstenite;

pub use tungstenite::{TungsteniteHandle, TungsteniteTransport};
