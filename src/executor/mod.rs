#![allow(clippy::result_large_err)]

//! Script execution against DaVinci Resolve.
//!
//! [`LocalExecutor`] validates code, prepends [`scripts::PREAMBLE`], runs it in a fresh
//! interpreter subprocess and reports the outcome as an [`ExecutionResult`]. Failures
//! of the script itself (denylist hit, spawn error, non-zero exit, timeout) are values,
//! never `Err`. [`ScriptBackend`] lets callers swap in the HTTP bridge without knowing.

pub mod runner;
pub mod scripts;
pub mod snapshot;
pub mod validator;

use crate::bridge::BridgeClient;
use crate::core::config::{BridgeConfig, ResolveConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::utils::ResolveEnv;
use async_trait::async_trait;
use runner::{script_dir, ScriptRequest, ScriptRun, ScriptRunner, TokioScriptRunner};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use snapshot::{SnapshotError, StateSnapshot};

/// Outcome of one script. `exit_code == 0` is the only success signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

impl ExecutionResult {
    /// A failed result carrying only a diagnostic message.
    pub fn failure(message: impl Into<String>) -> Self {
        ExecutionResult {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes scripts and produces state snapshots, locally or through the bridge.
#[async_trait]
pub trait ScriptBackend: Send + Sync {
    async fn execute(&self, code: &str) -> Result<ExecutionResult, AppError>;

    /// Snapshot JSON text; a failed introspection yields the `{"error", "stdout"}` envelope.
    async fn snapshot(&self) -> Result<String, AppError>;

    /// Short label for logs ("local" or the bridge URL).
    fn describe(&self) -> String;
}

/// Knobs for [`LocalExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub interpreter: String,
    pub resolve_env: ResolveEnv,
    pub timeout: Duration,
    /// Prepended to every script, followed by a newline.
    pub preamble: String,
    pub temp_dir: Option<PathBuf>,
}

impl ExecutorSettings {
    pub fn from_config(config: &ResolveConfig) -> Self {
        ExecutorSettings {
            interpreter: config.python.clone(),
            resolve_env: ResolveEnv::new(&config.script_api, &config.script_lib),
            timeout: Duration::from_secs(config.timeout_seconds),
            preamble: scripts::PREAMBLE.to_string(),
            temp_dir: config.temp_dir.clone(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        ExecutorSettings::from_config(&ResolveConfig::default())
    }
}

/// Runs scripts in a subprocess on this host.
#[derive(Clone)]
pub struct LocalExecutor {
    settings: Arc<ExecutorSettings>,
    runner: Arc<dyn ScriptRunner>,
}

impl LocalExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self::with_runner(settings, Arc::new(TokioScriptRunner))
    }

    pub fn with_runner(settings: ExecutorSettings, runner: Arc<dyn ScriptRunner>) -> Self {
        LocalExecutor {
            settings: Arc::new(settings),
            runner,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Validates and runs user code. Never fails; problems are reported in the result.
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        if let Some(violation) = validator::validate(code) {
            tracing::warn!(violation = %violation, "script rejected before execution");
            return ExecutionResult::failure(violation);
        }
        self.run_script(code).await
    }

    /// Runs the fixed introspection script and returns snapshot JSON text.
    pub async fn snapshot(&self) -> String {
        let result = self.run_script(scripts::STATE_SCRIPT).await;
        snapshot::snapshot_text(result)
    }

    async fn run_script(&self, code: &str) -> ExecutionResult {
        let body = format!("{}\n{}", self.settings.preamble, code);
        let dir = script_dir(self.settings.temp_dir.as_deref());

        let mut run = match ScriptRun::create(&body, &dir) {
            Ok(run) => run,
            Err(err) => {
                tracing::error!(error = %err, dir = %dir.display(), "failed to write temp script");
                return ExecutionResult::failure(err.message);
            }
        };

        let request = ScriptRequest {
            interpreter: self.settings.interpreter.clone(),
            env: self.settings.resolve_env.script_vars(),
            timeout: self.settings.timeout,
        };

        let started = Instant::now();
        let outcome = self.runner.run(&mut run, &request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(output) if output.timed_out => {
                let notice = format!(
                    "Script timed out after {} seconds",
                    self.settings.timeout.as_secs()
                );
                let err = AppError::new(ErrorCategory::TimeoutFailure, notice.clone())
                    .with_code("RB-EXEC-004");
                tracing::warn!(error = %err, "script killed");
                ExecutionResult {
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: notice,
                    exit_code: 1,
                }
            }
            Ok(output) => ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                exit_code: output.exit_code,
            },
            Err(err) => {
                tracing::error!(error = %err, "interpreter could not be run");
                ExecutionResult::failure(err.message)
            }
        };

        tracing::info!(
            script = %run.path().display(),
            elapsed_ms,
            exit_code = result.exit_code,
            "script finished"
        );
        result
    }
}

#[async_trait]
impl ScriptBackend for LocalExecutor {
    async fn execute(&self, code: &str) -> Result<ExecutionResult, AppError> {
        Ok(LocalExecutor::execute(self, code).await)
    }

    async fn snapshot(&self) -> Result<String, AppError> {
        Ok(LocalExecutor::snapshot(self).await)
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}

/// Bridged when a client URL is configured, local otherwise.
pub fn backend_from_config(config: &BridgeConfig) -> Result<Arc<dyn ScriptBackend>, AppError> {
    if config.client.is_bridged() {
        let client = BridgeClient::from_config(&config.client)?;
        tracing::debug!(url = %client.base_url(), "using bridged script execution");
        return Ok(Arc::new(client));
    }
    Ok(Arc::new(LocalExecutor::new(ExecutorSettings::from_config(
        &config.resolve,
    ))))
}
