#![allow(clippy::result_large_err)]

//! Discovery and forwarding of operations exposed by the child DaVinci Resolve tool server.
//!
//! [`ToolProxy`] owns the single [`rpc::RpcChannel`]. `connect` launches the child,
//! performs the handshake and registers every discovered action, static resource and
//! resource template under an external name with a cached [`schema::Signature`].
//! After that, `call` validates arguments and forwards them; concurrent calls share the
//! channel and are correlated by request id.

pub mod content;
pub mod context;
pub mod naming;
pub mod rpc;
pub mod schema;

use crate::core::config::BridgeConfig;
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, ProxyState};
use crate::utils::ResolveEnv;
use indexmap::IndexMap;
use rpc::{ChildCommand, RpcChannel, RpcError};
use schema::Signature;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const NOT_CONNECTED: &str = "DaVinci Resolve proxy is not connected";

/// Where a proxied operation forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardTarget {
    Action { tool: String },
    Resource { uri: String },
    Template { uri_template: String, params: Vec<String> },
    EditingContext,
}

/// A discovered operation as exposed to callers.
#[derive(Debug, Clone)]
pub struct ProxiedOperation {
    pub name: String,
    pub description: String,
    pub signature: Arc<Signature>,
    pub target: ForwardTarget,
}

/// Reply of a forwarded call. Child-side failures are replies, not `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReply {
    pub text: String,
    pub is_error: bool,
}

impl ToolReply {
    pub fn ok(text: impl Into<String>) -> Self {
        ToolReply {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ToolReply {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Counts per discovery pass; a pass that failed is listed in `skipped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub actions: usize,
    pub resources: usize,
    pub templates: usize,
    pub skipped: Vec<String>,
}

impl DiscoveryReport {
    pub fn total(&self) -> usize {
        self.actions + self.resources + self.templates
    }
}

/// Launch settings for the child server.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub command: ChildCommand,
    pub name_prefix: String,
}

impl ProxySettings {
    /// `<server_dir>/venv/bin/python3 <server_dir>/src/main.py` unless overridden.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let proxy = &config.proxy;
        let server_dir = absolute(&proxy.server_dir);
        let resolve_env = ResolveEnv::new(&config.resolve.script_api, &config.resolve.script_lib);

        let program = proxy.command.clone().unwrap_or_else(|| {
            server_dir
                .join("venv")
                .join("bin")
                .join("python3")
                .display()
                .to_string()
        });
        let args = proxy.args.clone().unwrap_or_else(|| {
            vec![server_dir.join("src").join("main.py").display().to_string()]
        });

        ProxySettings {
            command: ChildCommand {
                program,
                args,
                env: resolve_env.tool_server_vars(&server_dir),
                working_dir: proxy.working_dir.clone(),
            },
            name_prefix: proxy.name_prefix.clone(),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

pub struct ToolProxy {
    settings: ProxySettings,
    state: ProxyState,
    channel: Option<RpcChannel>,
    operations: IndexMap<String, ProxiedOperation>,
}

impl ToolProxy {
    pub fn new(settings: ProxySettings) -> Self {
        ToolProxy {
            settings,
            state: ProxyState::Disconnected,
            channel: None,
            operations: IndexMap::new(),
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn operations(&self) -> impl Iterator<Item = &ProxiedOperation> {
        self.operations.values()
    }

    pub fn operation(&self, name: &str) -> Option<&ProxiedOperation> {
        self.operations.get(name)
    }

    /// Launches the child, handshakes and registers everything it advertises.
    /// On failure the proxy is left disconnected and the error is returned to the caller.
    pub async fn connect(&mut self) -> Result<DiscoveryReport, AppError> {
        if self.state == ProxyState::Connected {
            self.shutdown().await;
        }
        self.state = ProxyState::Connecting;
        info!(
            program = %self.settings.command.program,
            args = ?self.settings.command.args,
            "spawning tool server"
        );

        let channel = match self.open_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                self.state = ProxyState::Disconnected;
                let mut app: AppError = err.into();
                app.category = ErrorCategory::ConnectionFailure;
                app.add_context("program", &self.settings.command.program);
                warn!(error = %app, "tool server unavailable; proxied operations disabled");
                return Err(app);
            }
        };

        let report = self.discover(&channel).await;
        self.channel = Some(channel);
        self.state = ProxyState::Connected;
        info!(
            actions = report.actions,
            resources = report.resources,
            templates = report.templates,
            "connected to tool server"
        );
        Ok(report)
    }

    async fn open_channel(&self) -> Result<RpcChannel, RpcError> {
        let channel = RpcChannel::spawn(&self.settings.command)?;
        match channel
            .initialize("resolve-bridge", crate::VERSION)
            .await
        {
            Ok(_) => Ok(channel),
            Err(err) => {
                channel.shutdown().await;
                Err(err)
            }
        }
    }

    async fn discover(&mut self, channel: &RpcChannel) -> DiscoveryReport {
        self.operations.clear();
        let mut report = DiscoveryReport::default();
        let prefix = self.settings.name_prefix.clone();

        match channel.list_all("tools/list", "tools").await {
            Ok(tools) => {
                for tool in &tools {
                    let Some(tool_name) = tool.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    let description = tool
                        .get("description")
                        .and_then(Value::as_str)
                        .filter(|text| !text.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("DaVinci Resolve: {}", tool_name));
                    let signature = tool
                        .get("inputSchema")
                        .map(Signature::from_schema)
                        .unwrap_or_default();
                    if self.register(ProxiedOperation {
                        name: naming::action_name(&prefix, tool_name),
                        description,
                        signature: Arc::new(signature),
                        target: ForwardTarget::Action {
                            tool: tool_name.to_string(),
                        },
                    }) {
                        report.actions += 1;
                    }
                }
            }
            Err(err) => skip_pass(&mut report, "tools", err),
        }

        match channel.list_all("resources/list", "resources").await {
            Ok(resources) => {
                for resource in &resources {
                    let Some(uri) = resource.get("uri").and_then(Value::as_str) else {
                        continue;
                    };
                    if self.register(ProxiedOperation {
                        name: naming::resource_name(&prefix, uri),
                        description: format!("[Read-only] {}", label(resource, uri)),
                        signature: Arc::new(Signature::empty()),
                        target: ForwardTarget::Resource {
                            uri: uri.to_string(),
                        },
                    }) {
                        report.resources += 1;
                    }
                }
            }
            Err(err) => skip_pass(&mut report, "resources", err),
        }

        match channel
            .list_all("resources/templates/list", "resourceTemplates")
            .await
        {
            Ok(templates) => {
                for template in &templates {
                    let Some(uri_template) = template.get("uriTemplate").and_then(Value::as_str)
                    else {
                        continue;
                    };
                    let params = naming::template_params(uri_template);
                    if self.register(ProxiedOperation {
                        name: naming::template_name(&prefix, uri_template),
                        description: format!("[Read-only] {}", label(template, uri_template)),
                        signature: Arc::new(Signature::required_strings(&params)),
                        target: ForwardTarget::Template {
                            uri_template: uri_template.to_string(),
                            params,
                        },
                    }) {
                        report.templates += 1;
                    }
                }
            }
            Err(err) => skip_pass(&mut report, "resource templates", err),
        }

        self.register(ProxiedOperation {
            name: context::EDITING_CONTEXT_OPERATION.to_string(),
            description: context::EDITING_CONTEXT_DESCRIPTION.to_string(),
            signature: Arc::new(Signature::empty()),
            target: ForwardTarget::EditingContext,
        });

        report
    }

    /// First registration of a name wins.
    fn register(&mut self, operation: ProxiedOperation) -> bool {
        if self.operations.contains_key(&operation.name) {
            warn!(name = %operation.name, "duplicate proxied operation name, keeping the first");
            return false;
        }
        self.operations.insert(operation.name.clone(), operation);
        true
    }

    /// Validates `args` against the operation's signature and forwards the call.
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolReply, AppError> {
        let Some(channel) = self.connected_channel() else {
            return Ok(ToolReply::error(NOT_CONNECTED));
        };
        let operation = self.operations.get(name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::ValidationRejection,
                format!("unknown operation {}", name),
            )
            .with_code("RB-PROXY-001")
        })?;
        let arguments = operation.signature.validate(&args).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationRejection,
                format!("invalid arguments for {}: {}", name, err),
            )
            .with_code("RB-PROXY-002")
        })?;

        let reply = match &operation.target {
            ForwardTarget::Action { tool } => {
                let params = json!({ "name": tool, "arguments": arguments });
                match channel.request("tools/call", params).await {
                    Ok(result) => {
                        let text = content::format_tool_content(
                            result.get("content").unwrap_or(&Value::Null),
                        );
                        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
                            ToolReply::error(format!("Resolve error: {}", text))
                        } else {
                            ToolReply::ok(text)
                        }
                    }
                    Err(err) => ToolReply::error(format!("Failed to call {}: {}", tool, err)),
                }
            }
            ForwardTarget::Resource { uri } => match context::read_resource(channel, uri).await {
                Ok(contents) => ToolReply::ok(content::format_resource_contents(&contents)),
                Err(err) => ToolReply::error(format!("Failed to read {}: {}", uri, err)),
            },
            ForwardTarget::Template {
                uri_template,
                params,
            } => {
                let uri = naming::expand_template(uri_template, params, &arguments);
                match context::read_resource(channel, &uri).await {
                    Ok(contents) => ToolReply::ok(content::format_resource_contents(&contents)),
                    Err(err) => {
                        ToolReply::error(format!("Failed to read {}: {}", uri_template, err))
                    }
                }
            }
            ForwardTarget::EditingContext => {
                let context = context::gather(channel).await;
                ToolReply::ok(serde_json::to_string_pretty(&context)?)
            }
        };

        if reply.is_error {
            warn!(operation = name, reply = %reply.text, "proxied call failed");
        }
        Ok(reply)
    }

    /// Convenience for the aggregate operation.
    pub async fn editing_context(&self) -> Result<ToolReply, AppError> {
        self.call(context::EDITING_CONTEXT_OPERATION, json!({})).await
    }

    fn connected_channel(&self) -> Option<&RpcChannel> {
        if self.state != ProxyState::Connected {
            return None;
        }
        self.channel.as_ref().filter(|channel| !channel.is_closed())
    }

    /// Closes the channel and stops the child. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.shutdown().await;
            info!("tool server disconnected");
        }
        self.operations.clear();
        self.state = ProxyState::Disconnected;
    }
}

fn label<'a>(entry: &'a Value, fallback: &'a str) -> &'a str {
    entry
        .get("description")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .or_else(|| {
            entry
                .get("name")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .unwrap_or(fallback)
}

fn skip_pass(report: &mut DiscoveryReport, pass: &str, err: RpcError) {
    let app = AppError::new(
        ErrorCategory::DiscoveryFailure,
        format!("{} discovery failed: {}", pass, err),
    )
    .with_code("RB-PROXY-010");
    warn!(error = %app, "continuing without {}", pass);
    report.skipped.push(pass.to_string());
}
