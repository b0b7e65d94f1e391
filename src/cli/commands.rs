use crate::{
    bridge::{client::is_auth_failure, serve_bridge, BridgeClient},
    cli::args::{ExecArgs, ProxyArgs, ProxyCallArgs, ProxyCommand, ProxyListArgs, StateArgs},
    core::{config::BridgeConfig, error::AppError},
    executor::{
        backend_from_config, snapshot::StateSnapshot, validator, ExecutorSettings, LocalExecutor,
    },
    proxy::{ProxySettings, ToolProxy, ToolReply},
    utils::shutdown_signal,
    Result,
};
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::{fs, io::Read};
use tracing::{info, warn};

/// Exit status used when a proxy command is interrupted.
const INTERRUPTED: i32 = 130;

pub async fn exec(config: &BridgeConfig, args: ExecArgs) -> Result<i32> {
    if args.list_blocked {
        for pattern in validator::blocked_patterns() {
            println!("{}", pattern);
        }
        return Ok(0);
    }

    let code = read_code(&args)?;
    let description = args.description.as_deref();
    let result = if config.client.is_bridged() {
        let client = BridgeClient::from_config(&config.client)?;
        info!(url = %client.base_url(), description = description.unwrap_or_default(), "executing script on bridge");
        client
            .execute_code(&code, description)
            .await
            .map_err(|err| bridge_failure(err.into()))?
    } else {
        let backend = backend_from_config(config)?;
        info!(backend = %backend.describe(), description = description.unwrap_or_default(), "executing script");
        backend.execute(&code).await.map_err(bridge_failure)?
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.exit_code)
}

fn read_code(args: &ExecArgs) -> Result<String> {
    let code = if let Some(path) = &args.file {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?
    } else if let Some(code) = &args.code {
        code.clone()
    } else {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read script from stdin")?;
        buffer
    };

    if code.trim().is_empty() {
        bail!("no script given; pass CODE, --file, or pipe it on stdin");
    }
    Ok(code)
}

pub async fn state(config: &BridgeConfig, args: StateArgs) -> Result<i32> {
    let backend = backend_from_config(config)?;
    let text = backend.snapshot().await.map_err(bridge_failure)?;

    let status = match StateSnapshot::parse(&text) {
        Ok(_) => 0,
        Err(err) => {
            let err = AppError::from(err);
            warn!(error = %err, "snapshot did not complete");
            1
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(value) if args.compact => println!("{}", value),
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", text),
    }
    Ok(status)
}

pub async fn serve(config: &BridgeConfig) -> Result<i32> {
    let executor = LocalExecutor::new(ExecutorSettings::from_config(&config.resolve));
    info!(
        interpreter = %executor.settings().interpreter,
        timeout_secs = executor.settings().timeout.as_secs(),
        "starting bridge server"
    );
    serve_bridge(config, executor).await?;
    Ok(0)
}

pub async fn health(config: &BridgeConfig) -> Result<i32> {
    if !config.client.is_bridged() {
        bail!("no bridge configured; set RESOLVE_BRIDGE_URL or client.url");
    }
    let client = BridgeClient::from_config(&config.client)?;
    let ok = client
        .health()
        .await
        .map_err(|err| bridge_failure(err.into()))?;
    println!("{}", json!({ "url": client.base_url().as_str(), "ok": ok }));
    Ok(if ok { 0 } else { 1 })
}

pub async fn proxy(config: &BridgeConfig, args: ProxyArgs) -> Result<i32> {
    if !config.proxy.enabled {
        bail!("the tool proxy is disabled (proxy.enabled = false)");
    }

    let mut proxy = ToolProxy::new(ProxySettings::from_config(config));
    let report = proxy.connect().await?;
    if !report.skipped.is_empty() {
        warn!(skipped = ?report.skipped, "some discovery passes failed");
    }

    let outcome = tokio::select! {
        outcome = run_proxy_command(&proxy, args.command) => outcome,
        _ = shutdown_signal() => Ok(INTERRUPTED),
    };
    proxy.shutdown().await;
    outcome
}

async fn run_proxy_command(proxy: &ToolProxy, command: ProxyCommand) -> Result<i32> {
    match command {
        ProxyCommand::List(list_args) => list_operations(proxy, list_args),
        ProxyCommand::Call(call_args) => call_operation(proxy, call_args).await,
        ProxyCommand::Context => print_reply(proxy.editing_context().await?),
    }
}

fn list_operations(proxy: &ToolProxy, args: ProxyListArgs) -> Result<i32> {
    if args.json {
        let listing: Vec<Value> = proxy
            .operations()
            .map(|operation| {
                json!({
                    "name": operation.name,
                    "description": operation.description,
                    "inputSchema": operation.signature.to_json_schema(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(0);
    }

    for operation in proxy.operations() {
        let summary = operation.description.lines().next().unwrap_or_default();
        println!("{:<40} {}", operation.name, summary);
    }
    Ok(0)
}

async fn call_operation(proxy: &ToolProxy, args: ProxyCallArgs) -> Result<i32> {
    let arguments: Value = serde_json::from_str(&args.args)
        .with_context(|| format!("--args is not valid JSON: {}", args.args))?;
    print_reply(proxy.call(&args.name, arguments).await?)
}

fn print_reply(reply: ToolReply) -> Result<i32> {
    if reply.is_error {
        eprintln!("{}", reply.text);
        return Ok(1);
    }
    println!("{}", reply.text);
    Ok(0)
}

fn bridge_failure(err: AppError) -> anyhow::Error {
    if is_auth_failure(&err) {
        return anyhow!(err).context("bridge rejected the token; check RESOLVE_BRIDGE_TOKEN");
    }
    anyhow!(err)
}
