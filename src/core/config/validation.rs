#![allow(clippy::result_large_err)]

use super::BridgeConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::net::SocketAddr;
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules shared by every command.
    pub fn validate(config: &BridgeConfig) -> Result<(), AppError> {
        if config.resolve.timeout_seconds == 0 {
            return Err(invalid("resolve.timeout_seconds must be greater than zero"));
        }

        if config.resolve.python.trim().is_empty() {
            return Err(invalid("resolve.python cannot be empty"));
        }

        if config.client.timeout_seconds == 0 {
            return Err(invalid("client.timeout_seconds must be greater than zero"));
        }

        if config.client.is_bridged() {
            let raw = config.client.url.as_deref().unwrap_or_default();
            let parsed = Url::parse(raw)
                .map_err(|err| invalid(format!("client.url {} is not a valid URL: {}", raw, err)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(invalid("client.url must use http or https"));
            }
        }

        if config.proxy.name_prefix.trim().is_empty() {
            return Err(invalid("proxy.name_prefix cannot be empty"));
        }

        Ok(())
    }

    /// Extra checks applied before the bridge server starts listening.
    pub fn validate_server(config: &BridgeConfig) -> Result<SocketAddr, AppError> {
        if config.bridge.token.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "BRIDGE_TOKEN is required for security; refusing to start the bridge server",
            )
            .with_code("RB-CFG-010"));
        }

        let addr = config.bridge.listen_addr();
        addr.parse::<SocketAddr>().map_err(|err| {
            invalid(format!("invalid bridge bind address {}: {}", addr, err))
        })
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("RB-CFG-003")
}
