pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, ConfigLoader, ConfigValidator};
pub use error::AppError;
pub use types::*;
