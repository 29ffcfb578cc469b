//! resocket tools - Main Library
//!
//! Binary-side helpers for the resocket workspace.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, config,
//!   logging, runners, shutdown)
//! - **resocket**: Reconnecting WebSocket client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use resocket_tools::bin_common::{load_config_from_env, ConfigType, ProbeConfig};
//! use resocket_tools::resocket::ReconnectingSocket;
//! ```

// Re-export workspace libraries for convenience
pub use resocket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use config::{ConfigError, ProbeConfig};
    pub use logging::init_tracing_with_level;
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
