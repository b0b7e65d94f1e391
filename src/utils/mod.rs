//! Utility helpers: Resolve integration environment and termination signals.
pub mod env;
pub mod signals;

pub use env::ResolveEnv;
pub use signals::shutdown_signal;
