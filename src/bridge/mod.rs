//! HTTP bridge letting a remote host drive the executor colocated with Resolve.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{BridgeClient, BridgeError};
pub use protocol::{ErrorBody, ExecutionRequest, HealthResponse, StateResponse};
pub use server::{serve_bridge, serve_bridge_with_ready_notifier};
