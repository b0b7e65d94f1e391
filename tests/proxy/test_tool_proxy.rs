use resolve_bridge::core::types::{ErrorCategory, ProxyState};
use resolve_bridge::proxy::rpc::ChildCommand;
use resolve_bridge::proxy::{ForwardTarget, ProxySettings, ToolProxy, NOT_CONNECTED};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

fn settings(mode: &str) -> ProxySettings {
    let mut env = HashMap::new();
    env.insert("FAKE_TOOL_SERVER_MODE".to_string(), mode.to_string());
    ProxySettings {
        command: ChildCommand {
            program: env!("CARGO_BIN_EXE_fake_tool_server").to_string(),
            args: vec![],
            env,
            working_dir: None,
        },
        name_prefix: "resolve".to_string(),
    }
}

async fn connected(mode: &str) -> ToolProxy {
    let mut proxy = ToolProxy::new(settings(mode));
    proxy.connect().await.expect("fake tool server should connect");
    proxy
}

#[tokio::test]
async fn test_discovers_actions_resources_and_templates() {
    let mut proxy = ToolProxy::new(settings(""));
    let report = proxy.connect().await.unwrap();

    assert_eq!(proxy.state(), ProxyState::Connected);
    assert_eq!(report.actions, 4, "tools from both pages");
    assert_eq!(report.resources, 5);
    assert_eq!(report.templates, 1);
    assert!(report.skipped.is_empty());

    let names: Vec<&str> = proxy.operations().map(|op| op.name.as_str()).collect();
    for expected in [
        "resolve-add_marker",
        "resolve-fail_tool",
        "resolve-get_project_name",
        "resolve-echo_after",
        "resolve-read-current-project",
        "resolve-read-thumbnail",
        "resolve-read-clips-properties",
        "get-editing-context",
    ] {
        assert!(names.contains(&expected), "missing {} in {:?}", expected, names);
    }

    let unnamed = proxy.operation("resolve-get_project_name").unwrap();
    assert_eq!(unnamed.description, "DaVinci Resolve: get_project_name");

    let resource = proxy.operation("resolve-read-thumbnail").unwrap();
    assert_eq!(resource.description, "[Read-only] Current frame thumbnail");
    assert!(resource.signature.is_empty());

    let template = proxy.operation("resolve-read-clips-properties").unwrap();
    assert_eq!(
        template.target,
        ForwardTarget::Template {
            uri_template: "resolve://clips/{clip_name}/properties".to_string(),
            params: vec!["clip_name".to_string()],
        }
    );
    assert!(template.signature.fields()["clip_name"].required);

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_action_call_forwards_cleaned_arguments() {
    let mut proxy = connected("").await;

    let reply = proxy
        .call(
            "resolve-add_marker",
            json!({"frame": 10, "note": null, "unknown": true}),
        )
        .await
        .unwrap();
    assert!(!reply.is_error);
    assert_eq!(reply.text, r#"add_marker {"color":"Blue","frame":10}"#);

    let reply = proxy
        .call("resolve-add_marker", json!({"frame": 12, "track": 2}))
        .await
        .unwrap();
    assert_eq!(reply.text, r#"add_marker {"color":"Blue","frame":12,"track":2}"#);

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected_locally() {
    let mut proxy = connected("").await;

    let missing = proxy
        .call("resolve-add_marker", json!({"color": "Red"}))
        .await
        .unwrap_err();
    assert_eq!(missing.category, ErrorCategory::ValidationRejection);

    let bad_choice = proxy
        .call("resolve-add_marker", json!({"frame": 1, "color": "Purple"}))
        .await
        .unwrap_err();
    assert_eq!(bad_choice.category, ErrorCategory::ValidationRejection);

    let unknown = proxy.call("resolve-does-not-exist", json!({})).await.unwrap_err();
    assert_eq!(unknown.category, ErrorCategory::ValidationRejection);

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_child_reported_errors_become_error_replies() {
    let mut proxy = connected("").await;

    let reply = proxy.call("resolve-fail_tool", json!({})).await.unwrap();
    assert!(reply.is_error);
    assert_eq!(reply.text, "Resolve error: No timeline open");

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_resource_and_template_reads() {
    let mut proxy = connected("").await;

    let project = proxy
        .call("resolve-read-current-project", json!({}))
        .await
        .unwrap();
    assert_eq!(project.text, r#"{"name": "Trailer"}"#);

    let thumbnail = proxy.call("resolve-read-thumbnail", json!({})).await.unwrap();
    assert_eq!(thumbnail.text, "[blob: resolve://thumbnail]");

    let properties = proxy
        .call(
            "resolve-read-clips-properties",
            json!({"clip_name": "A001 (take 2)"}),
        )
        .await
        .unwrap();
    assert_eq!(properties.text, "properties of A001%20(take%202)");

    let missing = proxy
        .call("resolve-read-clips-properties", json!({}))
        .await
        .unwrap_err();
    assert_eq!(missing.category, ErrorCategory::ValidationRejection);

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_editing_context_aggregates_four_reads() {
    let mut proxy = connected("").await;

    let reply = proxy.editing_context().await.unwrap();
    assert!(!reply.is_error);
    let context: Value = serde_json::from_str(&reply.text).unwrap();
    assert_eq!(context["current_project"], json!({"name": "Trailer"}));
    assert_eq!(context["current_timeline"]["fps"], json!(24));
    assert_eq!(context["timeline_clips"][0]["name"], json!("A001"));
    assert_eq!(context["media_pool_clips"], json!([]));

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_editing_context_reports_failed_reads_inline() {
    let mut proxy = connected("broken-media-pool").await;

    let reply = proxy.editing_context().await.unwrap();
    let context: Value = serde_json::from_str(&reply.text).unwrap();
    assert_eq!(context["current_project"], json!({"name": "Trailer"}));
    let error = context["media_pool_clips"]["error"].as_str().unwrap();
    assert!(error.contains("Media pool unavailable"), "{}", error);

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_failed_discovery_pass_is_skipped() {
    let mut proxy = ToolProxy::new(settings("no-templates"));
    let report = proxy.connect().await.unwrap();

    assert_eq!(proxy.state(), ProxyState::Connected);
    assert_eq!(report.templates, 0);
    assert_eq!(report.skipped, vec!["resource templates".to_string()]);
    assert_eq!(report.actions, 4);
    assert!(proxy.operation("resolve-read-clips-properties").is_none());

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_looping_tool_pages_do_not_block_connect() {
    let mut proxy = ToolProxy::new(settings("looping-cursor"));
    let report = tokio::time::timeout(Duration::from_secs(10), proxy.connect())
        .await
        .expect("connect must finish")
        .unwrap();

    assert_eq!(proxy.state(), ProxyState::Connected);
    assert_eq!(report.skipped, vec!["tools".to_string()]);
    assert_eq!(report.actions, 0);
    assert_eq!(report.resources, 5);
    assert_eq!(report.templates, 1);
    assert!(proxy.operation("get-editing-context").is_some());

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_name_collision_keeps_first_registration() {
    let mut proxy = ToolProxy::new(settings("duplicate"));
    let report = proxy.connect().await.unwrap();

    assert_eq!(report.actions, 5);
    assert_eq!(report.resources, 4);
    assert_eq!(
        proxy.operation("resolve-read-current-project").unwrap().target,
        ForwardTarget::Action {
            tool: "read-current-project".to_string()
        }
    );

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_replies() {
    let mut proxy = connected("").await;

    let (slow, fast) = tokio::join!(
        proxy.call("resolve-echo_after", json!({"text": "slow", "delay_ms": 300})),
        proxy.call("resolve-echo_after", json!({"text": "fast", "delay_ms": 0})),
    );
    assert_eq!(slow.unwrap().text, "slow");
    assert_eq!(fast.unwrap().text, "fast");

    proxy.shutdown().await;
}

#[tokio::test]
async fn test_handshake_failure_leaves_proxy_disconnected() {
    let mut proxy = ToolProxy::new(settings("exit-on-init"));
    let err = proxy.connect().await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::ConnectionFailure);
    assert_eq!(proxy.state(), ProxyState::Disconnected);
    let reply = proxy.call("resolve-add_marker", json!({"frame": 1})).await.unwrap();
    assert!(reply.is_error);
    assert_eq!(reply.text, NOT_CONNECTED);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let mut proxy = connected("").await;

    proxy.shutdown().await;
    proxy.shutdown().await;

    assert_eq!(proxy.state(), ProxyState::Disconnected);
    assert_eq!(proxy.operations().count(), 0);
    let reply = proxy.call("get-editing-context", json!({})).await.unwrap();
    assert_eq!(reply.text, NOT_CONNECTED);
}
