use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use resolve_bridge::bridge::client::is_auth_failure;
use resolve_bridge::bridge::{serve_bridge_with_ready_notifier, BridgeClient, BridgeError};
use resolve_bridge::core::config::BridgeConfig;
use resolve_bridge::core::error::AppError;
use resolve_bridge::core::types::ErrorCategory;
use resolve_bridge::executor::runner::{ScriptOutput, ScriptRequest, ScriptRun, ScriptRunner};
use resolve_bridge::executor::{ExecutorSettings, LocalExecutor, ScriptBackend};
use resolve_bridge::utils::ResolveEnv;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "valid-token";

/// Counts calls and answers with a fixed output.
struct SpyRunner {
    calls: AtomicUsize,
    stdout: &'static str,
}

#[async_trait]
impl ScriptRunner for SpyRunner {
    async fn run(
        &self,
        _run: &mut ScriptRun,
        _request: &ScriptRequest,
    ) -> Result<ScriptOutput, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptOutput {
            stdout: self.stdout.as_bytes().to_vec(),
            ..Default::default()
        })
    }
}

struct PanicRunner;

#[async_trait]
impl ScriptRunner for PanicRunner {
    async fn run(
        &self,
        _run: &mut ScriptRun,
        _request: &ScriptRequest,
    ) -> Result<ScriptOutput, AppError> {
        panic!("interpreter exploded");
    }
}

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        interpreter: "sh".to_string(),
        resolve_env: ResolveEnv::new("/opt/resolve/api", "/opt/resolve/fusionscript.so"),
        timeout: Duration::from_secs(10),
        preamble: String::new(),
        temp_dir: None,
    }
}

fn spy(stdout: &'static str) -> Arc<SpyRunner> {
    Arc::new(SpyRunner {
        calls: AtomicUsize::new(0),
        stdout,
    })
}

fn bridge_config(max_body_bytes: usize) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.bridge.bind = "127.0.0.1".to_string();
    config.bridge.port = 0;
    config.bridge.token = TOKEN.to_string();
    config.bridge.max_body_bytes = max_body_bytes;
    config
}

async fn spawn_bridge(
    config: BridgeConfig,
    executor: LocalExecutor,
) -> Result<(SocketAddr, JoinHandle<Result<(), AppError>>)> {
    let (tx, rx) = oneshot::channel();
    let handle =
        tokio::spawn(async move { serve_bridge_with_ready_notifier(&config, executor, tx).await });
    let addr = tokio::time::timeout(Duration::from_secs(5), rx).await??;
    Ok((addr, handle))
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_round_trip_through_client() -> Result<()> {
    let direct = LocalExecutor::new(settings());
    let (addr, handle) = spawn_bridge(bridge_config(1024 * 1024), direct.clone()).await?;
    let client = BridgeClient::new(&format!("http://{}", addr), TOKEN, Duration::from_secs(10))?;

    let result = client.execute_code("echo bridged; echo note >&2", Some("smoke test")).await?;
    assert_eq!(result.stdout, "bridged");
    assert_eq!(result.stderr, "note");
    assert_eq!(result.exit_code, 0);

    for code in [
        "echo '  padded  '; printf 'caf\\303\\251\\n'",
        "echo out; echo err >&2; exit 3",
        "printf 'no newline'",
        "import os\nos.system('ls')",
    ] {
        let bridged = client.execute_code(code, None).await?;
        assert_eq!(bridged, direct.execute(code).await, "code: {}", code);
    }

    let blocked = ScriptBackend::execute(&client, "import os\nos.system('ls')").await?;
    assert_eq!(blocked.exit_code, 1);
    assert!(blocked.stderr.starts_with("Blocked: script contains \"os.system(\""));

    assert!(client.health().await?);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_state_returns_snapshot_text() -> Result<()> {
    let runner = spy(r#"{"project": "Trailer"}"#);
    let executor = LocalExecutor::with_runner(settings(), runner.clone());
    let (addr, handle) = spawn_bridge(bridge_config(1024), executor).await?;
    let client = BridgeClient::new(&format!("http://{}/", addr), TOKEN, Duration::from_secs(10))?;

    let state = client.state().await?;
    assert_eq!(state, r#"{"project": "Trailer"}"#);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_requests_without_valid_token_never_execute() -> Result<()> {
    let runner = spy("should not run");
    let executor = LocalExecutor::with_runner(settings(), runner.clone());
    let (addr, handle) = spawn_bridge(bridge_config(1024), executor).await?;
    let http = reqwest::Client::new();

    for endpoint in ["execute", "state"] {
        let url = format!("http://{}/{}", addr, endpoint);

        let resp = http.post(&url).json(&json!({"code": "print(1)"})).send().await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await?;
        assert_eq!(body, json!({"error": "Unauthorized"}));

        let resp = http
            .post(&url)
            .bearer_auth("wrong-token")
            .json(&json!({"code": "print(1)"}))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = http
            .post(&url)
            .header("authorization", TOKEN)
            .json(&json!({"code": "print(1)"}))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);

    let resp = http.get(format!("http://{}/health", addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await?, json!({"ok": true}));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_client_reports_rejected_token() -> Result<()> {
    let executor = LocalExecutor::with_runner(settings(), spy(""));
    let (addr, handle) = spawn_bridge(bridge_config(1024), executor).await?;
    let client = BridgeClient::new(&format!("http://{}", addr), "nope", Duration::from_secs(5))?;

    let err = client.execute_code("print(1)", None).await.unwrap_err();
    match &err {
        BridgeError::Status { status, body } => {
            assert_eq!(*status, 401);
            assert!(body.contains("Unauthorized"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    let app: AppError = err.into();
    assert!(is_auth_failure(&app));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_unknown_routes_and_methods_are_not_found() -> Result<()> {
    let executor = LocalExecutor::with_runner(settings(), spy(""));
    let (addr, handle) = spawn_bridge(bridge_config(1024), executor).await?;
    let http = reqwest::Client::new();

    let resp = http.get(format!("http://{}/nope", addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<Value>().await?, json!({"error": "Not found"}));

    let resp = http
        .get(format!("http://{}/execute", addr))
        .bearer_auth(TOKEN)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<Value>().await?, json!({"error": "Not found"}));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_malformed_and_oversized_bodies() -> Result<()> {
    let runner = spy("");
    let executor = LocalExecutor::with_runner(settings(), runner.clone());
    let (addr, handle) = spawn_bridge(bridge_config(64), executor).await?;
    let http = reqwest::Client::new();
    let url = format!("http://{}/execute", addr);

    let resp = http
        .post(&url)
        .bearer_auth(TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert!(body["error"].as_str().unwrap().contains("invalid JSON body"));

    let resp = http
        .post(&url)
        .bearer_auth(TOKEN)
        .json(&json!({"code": "x".repeat(512)}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.json::<Value>().await?, json!({"error": "Payload too large"}));

    // Token is checked before the size limit.
    let resp = http
        .post(&url)
        .bearer_auth("wrong-token")
        .json(&json!({"code": "x".repeat(512)}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>().await?, json!({"error": "Unauthorized"}));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_handler_panic_becomes_json_500() -> Result<()> {
    let executor = LocalExecutor::with_runner(settings(), Arc::new(PanicRunner));
    let (addr, handle) = spawn_bridge(bridge_config(1024), executor).await?;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{}/execute", addr))
        .bearer_auth(TOKEN)
        .json(&json!({"code": "print(1)"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], json!("interpreter exploded"));

    let resp = http.get(format!("http://{}/health", addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_server_refuses_to_start_without_token() {
    let mut config = bridge_config(1024);
    config.bridge.token = "   ".to_string();
    let (tx, _rx) = oneshot::channel();

    let err = serve_bridge_with_ready_notifier(&config, LocalExecutor::new(settings()), tx)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigurationError);
    assert!(err.is_fatal());
    assert!(err.message.contains("BRIDGE_TOKEN"));
}

#[tokio::test]
async fn test_client_sends_bearer_token_and_request_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({"code": "print(1)", "description": "marker pass"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stdout": "1",
            "stderr": "",
            "exitCode": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BridgeClient::new(&server.uri(), "secret", Duration::from_secs(5))?;
    let result = client.execute_code("print(1)", Some("marker pass")).await?;
    assert_eq!(result.stdout, "1");
    assert_eq!(result.exit_code, 0);
    Ok(())
}

#[tokio::test]
async fn test_client_surfaces_status_and_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/state"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = BridgeClient::new(&server.uri(), "secret", Duration::from_secs(5))?;
    let err = ScriptBackend::snapshot(&client).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TransportFailure);
    assert_eq!(err.message, "Bridge error (502): upstream down");
    assert!(!is_auth_failure(&err));
    Ok(())
}

#[tokio::test]
async fn test_client_network_failure_is_transport_error() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = BridgeClient::new(&format!("http://{}", addr), "t", Duration::from_secs(2))?;
    let err = ScriptBackend::execute(&client, "print(1)").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TransportFailure);
    Ok(())
}
