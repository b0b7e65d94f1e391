use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: ~/.resolve-bridge/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Per-script timeout, e.g. "90s" or "2m" (overrides resolve.timeout_seconds)
    #[arg(long, global = true, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Python code to run; read from stdin when neither CODE nor --file is given
    #[arg(value_name = "CODE", conflicts_with = "file")]
    pub code: Option<String>,

    /// Read the script from this file
    #[arg(long, short = 'f', value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Human-readable note about what the script does (logged, forwarded to bridges)
    #[arg(long, short = 'd', value_name = "TEXT")]
    pub description: Option<String>,

    /// Print the blocked substrings and exit
    #[arg(long)]
    pub list_blocked: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Print the snapshot on one line
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind (overrides bridge.bind / BRIDGE_BIND)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Port to listen on (overrides bridge.port / BRIDGE_PORT)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    #[command(subcommand)]
    pub command: ProxyCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProxyCommand {
    /// List every operation discovered on the tool server
    List(ProxyListArgs),
    /// Validate arguments and forward one call
    Call(ProxyCallArgs),
    /// Fetch project, timeline, clips and media pool in one call
    Context,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyListArgs {
    /// Print name, description and argument schema as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyCallArgs {
    /// External operation name, e.g. resolve-add_marker
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Arguments as a JSON object
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub args: String,
}
