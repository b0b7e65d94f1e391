use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

pub const DEFAULT_SCRIPT_API: &str =
    "/Library/Application Support/Blackmagic Design/DaVinci Resolve/Developer/Scripting";
pub const DEFAULT_SCRIPT_LIB: &str =
    "/Applications/DaVinci Resolve/DaVinci Resolve.app/Contents/Libraries/Fusion/fusionscript.so";

/// Main configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Local interpreter and Resolve integration paths
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Bridge server settings (the host colocated with Resolve)
    #[serde(default)]
    pub bridge: BridgeServerConfig,

    /// Bridge client settings; a configured url switches execution to bridged mode
    #[serde(default)]
    pub client: BridgeClientConfig,

    /// Child tool server settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Resolve scripting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default = "default_script_api")]
    pub script_api: PathBuf,

    #[serde(default = "default_script_lib")]
    pub script_lib: PathBuf,

    /// Interpreter used to run scripts
    #[serde(default = "default_python")]
    pub python: String,

    /// Hard wall-clock limit for one script
    #[serde(default = "default_script_timeout")]
    pub timeout_seconds: u64,

    /// Directory for generated script files (default: system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

/// Bridge server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret; the server refuses to start while this is empty
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Bridge client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub token: String,

    /// Network wait limit, independent of the remote script timeout
    #[serde(default = "default_client_timeout")]
    pub timeout_seconds: u64,
}

/// Child tool server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_enabled")]
    pub enabled: bool,

    /// Checkout of the child server (holds venv/ and src/main.py)
    #[serde(default = "default_server_dir")]
    pub server_dir: PathBuf,

    /// Explicit command; defaults to <server_dir>/venv/bin/python3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Explicit arguments; defaults to <server_dir>/src/main.py
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_file: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
}

// Default functions
fn default_script_api() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPT_API)
}

fn default_script_lib() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPT_LIB)
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_script_timeout() -> u64 {
    60
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

fn default_client_timeout() -> u64 {
    120
}

fn default_proxy_enabled() -> bool {
    true
}

fn default_server_dir() -> PathBuf {
    PathBuf::from("../davinci-resolve-mcp")
}

fn default_name_prefix() -> String {
    "resolve".to_string()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig {
            script_api: default_script_api(),
            script_lib: default_script_lib(),
            python: default_python(),
            timeout_seconds: default_script_timeout(),
            temp_dir: None,
        }
    }
}

impl Default for BridgeServerConfig {
    fn default() -> Self {
        BridgeServerConfig {
            bind: default_bind(),
            port: default_port(),
            token: String::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        BridgeClientConfig {
            url: None,
            token: String::new(),
            timeout_seconds: default_client_timeout(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            enabled: default_proxy_enabled(),
            server_dir: default_server_dir(),
            command: None,
            args: None,
            working_dir: None,
            name_prefix: default_name_prefix(),
        }
    }
}

impl BridgeServerConfig {
    /// Socket address string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl BridgeClientConfig {
    /// True when a bridge URL is configured and execution should be forwarded.
    pub fn is_bridged(&self) -> bool {
        self.url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}
