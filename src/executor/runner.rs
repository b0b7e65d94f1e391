#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long reader tasks may keep draining after the process is gone. Grandchildren
/// that inherited the pipes would otherwise hold them open indefinitely.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Everything needed to launch one script.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub interpreter: String,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

/// Raw outcome of one interpreter run, before trimming.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Scoped ownership of one call's temp script and interpreter process.
///
/// Dropping the guard deletes the script file and kills whatever is left of the
/// process (its whole group on Unix), so every exit path releases both.
pub struct ScriptRun {
    script: TempPath,
    child: Option<Child>,
}

impl ScriptRun {
    /// Writes `body` to `resolve_script_<unix-millis>_<random>.py` inside `dir`.
    pub fn create(body: &str, dir: &Path) -> Result<Self, AppError> {
        let prefix = format!(
            "resolve_script_{}_",
            chrono::Utc::now().timestamp_millis()
        );
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".py")
            .tempfile_in(dir)
            .map_err(|err| {
                AppError::with_source(ErrorCategory::IoError, err.to_string(), err)
                    .with_code("RB-EXEC-001")
            })?;
        file.as_file_mut().write_all(body.as_bytes()).map_err(|err| {
            AppError::with_source(ErrorCategory::IoError, err.to_string(), err)
                .with_code("RB-EXEC-001")
        })?;

        Ok(ScriptRun {
            script: file.into_temp_path(),
            child: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.script
    }

    /// Hands the spawned process to the guard.
    pub fn attach(&mut self, child: Child) -> &mut Child {
        self.child.insert(child)
    }

    /// Sends SIGKILL to the process group (Unix) or the process itself.
    pub fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{killpg, Signal};
                use nix::unistd::Pid;
                if let Some(pid) = child.id() {
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            }
            let _ = child.start_kill();
        }
    }
}

impl Drop for ScriptRun {
    fn drop(&mut self) {
        // id() is None once the process has been reaped.
        let running = self
            .child
            .as_ref()
            .map(|child| child.id().is_some())
            .unwrap_or(false);
        if running {
            self.kill();
        }
    }
}

impl std::fmt::Debug for ScriptRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRun")
            .field("script", &self.script.to_path_buf())
            .field("pid", &self.child.as_ref().and_then(|child| child.id()))
            .finish()
    }
}

/// The process-launching step of the executor.
#[async_trait]
pub trait ScriptRunner: Send + Sync + 'static {
    async fn run(
        &self,
        run: &mut ScriptRun,
        request: &ScriptRequest,
    ) -> Result<ScriptOutput, AppError>;
}

/// Spawns the interpreter with tokio, streaming both pipes into shared buffers.
#[derive(Debug, Default)]
pub struct TokioScriptRunner;

#[async_trait]
impl ScriptRunner for TokioScriptRunner {
    async fn run(
        &self,
        run: &mut ScriptRun,
        request: &ScriptRequest,
    ) -> Result<ScriptOutput, AppError> {
        let mut command = Command::new(&request.interpreter);
        command
            .arg(run.path())
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|err| {
            AppError::with_source(ErrorCategory::ExecutionFailure, err.to_string(), err)
                .with_code("RB-EXEC-002")
                .with_context("interpreter", request.interpreter.clone())
        })?;
        let child = run.attach(child);

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_capture(stdout, stdout_buf.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_capture(stderr, stderr_buf.clone()));
        }

        let (exit_code, timed_out) = match tokio::time::timeout(request.timeout, child.wait()).await
        {
            Ok(Ok(status)) => (status.code().unwrap_or(1), false),
            Ok(Err(err)) => {
                run.kill();
                abort_readers(readers).await;
                return Err(AppError::with_source(
                    ErrorCategory::ExecutionFailure,
                    format!("failed to wait for interpreter: {}", err),
                    err,
                )
                .with_code("RB-EXEC-003"));
            }
            Err(_) => {
                tracing::warn!(
                    script = %run.path().display(),
                    timeout_secs = request.timeout.as_secs(),
                    "script exceeded timeout, killing process group"
                );
                run.kill();
                if let Some(child) = run.child.as_mut() {
                    let _ = child.wait().await;
                }
                (1, true)
            }
        };

        abort_readers(readers).await;

        let stdout = std::mem::take(&mut *stdout_buf.lock().await);
        let stderr = std::mem::take(&mut *stderr_buf.lock().await);
        Ok(ScriptOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}

fn spawn_capture<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// Waits up to the grace period for readers to hit EOF, then aborts the stragglers.
async fn abort_readers(readers: Vec<JoinHandle<()>>) {
    let deadline = tokio::time::Instant::now() + READER_GRACE;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}

/// Directory for temp scripts: the configured one or the system temp dir.
pub fn script_dir(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir)
}
