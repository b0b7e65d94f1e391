pub mod args;
pub mod commands;

pub use args::{
    ExecArgs, GlobalArgs, ProxyArgs, ProxyCallArgs, ProxyCommand, ProxyListArgs, ServeArgs,
    StateArgs,
};
use crate::core::config::{BridgeConfig, ConfigLoader, ConfigValidator};
use anyhow::Context;
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "resolve-bridge")]
#[command(version = crate::VERSION)]
#[command(about = "Run Python against DaVinci Resolve locally, over HTTP, or through its tool server")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Set RESOLVE_BRIDGE_URL to send exec/state to a bridge server on the Resolve host instead of running locally."
)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Run a Python script against Resolve",
        long_about = "Exec validates the script against the denylist, prepends the Resolve connection preamble and runs it, printing {stdout, stderr, exitCode} as JSON. The process exits with the script's exit code.",
        after_help = "Examples:\n    resolve-bridge exec 'print(project.GetName())'\n    resolve-bridge exec --file grade.py --description \"apply LUT\""
    )]
    Exec(ExecArgs),
    #[command(
        about = "Print a JSON snapshot of the open project",
        long_about = "State runs the built-in introspection script and prints project, timelines, clips, markers and media pool as JSON.",
        after_help = "Example:\n    resolve-bridge state --compact"
    )]
    State(StateArgs),
    #[command(
        about = "Serve the HTTP bridge on the Resolve host",
        long_about = "Serve exposes POST /execute, POST /state and GET /health. BRIDGE_TOKEN must be set; every request except /health needs `Authorization: Bearer <token>`.",
        after_help = "Example:\n    BRIDGE_TOKEN=secret resolve-bridge serve --port 3001"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Check that the configured bridge server is up",
        after_help = "Example:\n    RESOLVE_BRIDGE_URL=http://10.0.0.2:3001 resolve-bridge health"
    )]
    Health,
    #[command(
        about = "Use operations discovered on the Resolve tool server",
        long_about = "Proxy launches the child tool server, discovers its tools, resources and resource templates, and exposes them under prefixed names.",
        after_help = "Examples:\n    resolve-bridge proxy list\n    resolve-bridge proxy call resolve-add_marker --args '{\"frame\": 10}'\n    resolve-bridge proxy context"
    )]
    Proxy(ProxyArgs),
}

/// Loads config, installs logging and runs the command. Returns the process exit code.
pub async fn run(args: Args) -> crate::Result<i32> {
    let mut config = ConfigLoader::load(args.global.config.as_deref())
        .map_err(anyhow::Error::from)
        .context("failed to load configuration")?;
    apply_overrides(&mut config, &args);
    ConfigValidator::validate(&config).map_err(anyhow::Error::from)?;

    let _logging = crate::logging::init(&args.command, &config.logging)?;
    tracing::debug!(version = crate::VERSION, "resolve-bridge starting");

    match args.command {
        Command::Exec(exec_args) => commands::exec(&config, exec_args).await,
        Command::State(state_args) => commands::state(&config, state_args).await,
        Command::Serve(_) => commands::serve(&config).await,
        Command::Health => commands::health(&config).await,
        Command::Proxy(proxy_args) => commands::proxy(&config, proxy_args).await,
    }
}

fn apply_overrides(config: &mut BridgeConfig, args: &Args) {
    if let Some(timeout) = args.global.timeout {
        config.resolve.timeout_seconds = timeout.as_secs().max(1);
    }
    if let Command::Serve(serve) = &args.command {
        if let Some(bind) = &serve.bind {
            config.bridge.bind = bind.clone();
        }
        if let Some(port) = serve.port {
            config.bridge.port = port;
        }
    }
}
