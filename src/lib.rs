pub mod bridge;
pub mod cli;
pub mod core;
pub mod executor;
pub mod logging;
pub mod proxy;
pub mod utils;

/// Current crate version string exposed for CLI, handshake and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
