#![allow(clippy::result_large_err)]

use super::BridgeConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config location: ~/.resolve-bridge/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".resolve-bridge").join("config.toml"))
    }

    /// Load config from an explicit path, or the default location when none is given.
    /// Environment variables override config file values.
    /// A missing file is not an error (defaults + env vars apply).
    pub fn load(path: Option<&Path>) -> Result<BridgeConfig, AppError> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);
        let config_file = match resolved {
            Some(ref path) => Self::load_from_file(path)?,
            None => None,
        };

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<BridgeConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("RB-CFG-001")
        })?;

        let config: BridgeConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("RB-CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(config: &mut BridgeConfig) {
        if let Ok(api) = env::var("RESOLVE_SCRIPT_API") {
            config.resolve.script_api = PathBuf::from(api);
        }

        if let Ok(lib) = env::var("RESOLVE_SCRIPT_LIB") {
            config.resolve.script_lib = PathBuf::from(lib);
        }

        if let Ok(python) = env::var("RESOLVE_PYTHON") {
            config.resolve.python = python;
        }

        if let Some(timeout) = parse_env::<u64>("RESOLVE_TIMEOUT_SECONDS") {
            config.resolve.timeout_seconds = timeout;
        }

        if let Ok(bind) = env::var("BRIDGE_BIND") {
            config.bridge.bind = bind;
        }

        if let Some(port) = parse_env::<u16>("BRIDGE_PORT") {
            config.bridge.port = port;
        }

        if let Ok(token) = env::var("BRIDGE_TOKEN") {
            config.bridge.token = token;
        }

        if let Ok(url) = env::var("RESOLVE_BRIDGE_URL") {
            config.client.url = Some(url);
        }

        if let Ok(token) = env::var("RESOLVE_BRIDGE_TOKEN") {
            config.client.token = token;
        }

        if let Some(timeout) = parse_env::<u64>("RESOLVE_BRIDGE_TIMEOUT_SECONDS") {
            config.client.timeout_seconds = timeout;
        }

        if let Ok(dir) = env::var("DAVINCI_MCP_PATH") {
            config.proxy.server_dir = PathBuf::from(dir);
        }

        if let Ok(command) = env::var("DAVINCI_MCP_COMMAND") {
            config.proxy.command = Some(command);
        }

        if let Ok(dir) = env::var("RESOLVE_BRIDGE_LOG_DIR") {
            config.logging.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "RESOLVE_SCRIPT_API - Resolve scripting API directory (holds Modules/)",
            "RESOLVE_SCRIPT_LIB - Path to fusionscript shared library",
            "RESOLVE_PYTHON - Interpreter used for scripts (default: python3)",
            "RESOLVE_TIMEOUT_SECONDS - Per-script timeout (default: 60)",
            "BRIDGE_BIND - Bridge server bind address (default: 0.0.0.0)",
            "BRIDGE_PORT - Bridge server port (default: 3001)",
            "BRIDGE_TOKEN - Bridge server shared secret (required to serve)",
            "RESOLVE_BRIDGE_URL - Forward execution to this bridge server",
            "RESOLVE_BRIDGE_TOKEN - Bearer token sent to the bridge server",
            "RESOLVE_BRIDGE_TIMEOUT_SECONDS - Bridge client network timeout (default: 120)",
            "DAVINCI_MCP_PATH - Child tool server checkout (default: ../davinci-resolve-mcp)",
            "DAVINCI_MCP_COMMAND - Override the child tool server command",
            "RESOLVE_BRIDGE_LOG_DIR - Directory for resolve-bridge.log",
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
