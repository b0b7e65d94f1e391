#![allow(clippy::result_large_err)]

//! Newline-delimited JSON-RPC 2.0 over a child process's stdio.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const METHOD_NOT_FOUND: i64 = -32601;
const EXIT_GRACE: Duration = Duration::from_secs(2);
const MAX_PAGES: usize = 1000;

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("failed to launch {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("tool server connection closed")]
    Closed,

    #[error("invalid reply from tool server: {0}")]
    Protocol(String),
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        let (category, code) = match err {
            RpcError::Spawn { .. } => (ErrorCategory::ConnectionFailure, "RB-RPC-001"),
            RpcError::Closed => (ErrorCategory::ConnectionFailure, "RB-RPC-002"),
            RpcError::Remote { .. } => (ErrorCategory::TransportFailure, "RB-RPC-003"),
            RpcError::Protocol(_) => (ErrorCategory::TransportFailure, "RB-RPC-004"),
        };
        AppError::new(category, err.to_string()).with_code(code)
    }
}

/// How to launch the child tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

/// Owned connection to one child process.
pub struct RpcChannel {
    child: Child,
    /// Group id of the child's process group, cleared once signalled.
    process_group: Option<i32>,
    stdin: SharedStdin,
    pending: Arc<Mutex<PendingMap>>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
    stderr_task: Option<JoinHandle<()>>,
}

impl RpcChannel {
    pub fn spawn(command: &ChildCommand) -> Result<Self, RpcError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so shutdown reaches whatever the server spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|err| RpcError::Spawn {
            command: command.program.clone(),
            message: err.to_string(),
        })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(RpcError::Spawn {
                command: command.program.clone(),
                message: "child stdio was not captured".to_string(),
            });
        };

        let process_group = child.id().map(|pid| pid as i32);
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "resolve_bridge::proxy::child", "{}", line);
                }
            })
        });

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(stdin)));
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_task = start_response_loop(stdout, stdin.clone(), pending.clone(), closed.clone());

        Ok(RpcChannel {
            child,
            process_group,
            stdin,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            reader_task,
            stderr_task,
        })
    }

    /// Sends a request and waits for the matching response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(RpcError::Closed);
            }
            map.insert(id, tx);
        }

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(err) = write_message(&self.stdin, &message).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        rx.await.unwrap_or(Err(RpcError::Closed))
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcError> {
        let mut message = json!({ "jsonrpc": "2.0", "method": method });
        if let Some(params) = params {
            message["params"] = params;
        }
        write_message(&self.stdin, &message).await
    }

    /// `initialize` handshake followed by `notifications/initialized`.
    pub async fn initialize(&self, client_name: &str, client_version: &str) -> Result<Value, RpcError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": client_name, "version": client_version },
                }),
            )
            .await?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    /// Follows `nextCursor` until exhausted, collecting `result[key]` arrays.
    /// A repeated cursor or more than `MAX_PAGES` pages is a protocol error.
    pub async fn list_all(&self, method: &str, key: &str) -> Result<Vec<Value>, RpcError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        for _ in 0..MAX_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.request(method, params).await?;
            let page = result
                .get(key)
                .and_then(Value::as_array)
                .ok_or_else(|| RpcError::Protocol(format!("{} reply has no \"{}\" array", method, key)))?;
            items.extend(page.iter().cloned());

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            match &cursor {
                None => return Ok(items),
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(RpcError::Protocol(format!(
                        "{} repeated cursor \"{}\"",
                        method, next
                    )));
                }
                Some(_) => {}
            }
        }
        Err(RpcError::Protocol(format!(
            "{} returned more than {} pages",
            method, MAX_PAGES
        )))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes stdin, gives the child a moment to exit, then kills it.
    pub async fn shutdown(mut self) {
        self.stdin.lock().await.take();
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "tool server exited"),
            Ok(Err(err)) => warn!(error = %err, "failed to wait for tool server"),
            Err(_) => {
                warn!("tool server did not exit after stdin closed, killing it");
                self.kill_group();
                let _ = self.child.kill().await;
            }
        }
        // Anything the server left running in its group.
        self.kill_group();
        self.reader_task.abort();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        fail_pending(&self.closed, &self.pending).await;
    }
}

impl RpcChannel {
    fn kill_group(&mut self) {
        let Some(pgid) = self.process_group.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.kill_group();
        self.reader_task.abort();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn write_message(stdin: &SharedStdin, message: &Value) -> Result<(), RpcError> {
    let mut line = message.to_string();
    line.push('\n');
    let mut guard = stdin.lock().await;
    let writer = guard.as_mut().ok_or(RpcError::Closed)?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|_| RpcError::Closed)?;
    writer.flush().await.map_err(|_| RpcError::Closed)
}

async fn fail_pending(closed: &AtomicBool, pending: &Mutex<PendingMap>) {
    closed.store(true, Ordering::SeqCst);
    let mut map = pending.lock().await;
    let count = map.len();
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(RpcError::Closed));
    }
    if count > 0 {
        warn!("failed {} pending tool server requests after disconnect", count);
    }
}

fn start_response_loop(
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: Arc<Mutex<PendingMap>>,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(_) => {
                    debug!("ignoring non-JSON line from tool server: {}", line);
                    continue;
                }
            };

            match (message.get("method").and_then(Value::as_str), message.get("id")) {
                // Request from the child.
                (Some(method), Some(id)) => {
                    let reply = if method == "ping" {
                        json!({ "jsonrpc": "2.0", "id": id, "result": {} })
                    } else {
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": METHOD_NOT_FOUND, "message": format!("Method not found: {}", method) },
                        })
                    };
                    if write_message(&stdin, &reply).await.is_err() {
                        debug!("could not answer tool server request {}", method);
                    }
                }
                (Some(method), None) => debug!("tool server notification: {}", method),
                (None, Some(id)) => {
                    let Some(id) = id.as_u64() else {
                        debug!("response with unexpected id: {}", id);
                        continue;
                    };
                    let outcome = match message.get("error") {
                        Some(error) => Err(RpcError::Remote {
                            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                            message: error
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown error")
                                .to_string(),
                        }),
                        None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                    };
                    if let Some(tx) = pending.lock().await.remove(&id) {
                        let _ = tx.send(outcome);
                    }
                }
                (None, None) => debug!("ignoring malformed tool server message: {}", line),
            }
        }
        debug!("tool server stdout closed");
        fail_pending(&closed, &pending).await;
    })
}
