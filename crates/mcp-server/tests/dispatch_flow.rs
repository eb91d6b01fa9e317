//! End-to-end dispatch tests over an in-memory duplex transport.

mod common;

use common::{
    happy_services, services, CheckerBehavior, FakeApi, FakeChecker, FakeProbe, TestServer,
};
use forgelink_mcp::dispatch::DispatcherConfig;
use serde_json::{json, Value};
use tokio::time::Duration;

fn config(max_concurrency: usize, timeout: Duration) -> DispatcherConfig {
    DispatcherConfig {
        max_concurrency,
        default_timeout: timeout,
        ..DispatcherConfig::default()
    }
}

fn default_config() -> DispatcherConfig {
    config(8, Duration::from_secs(5))
}

#[tokio::test]
async fn initialize_advertises_version_and_manifest() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server
        .send(json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}}))
        .await;
    let response = server.recv_expecting(json!(0)).await;

    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "1.0");
    assert_eq!(result["serverInfo"]["name"], "forgelink-mcp");
    let tools = result["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert_eq!(tools[0]["name"], "list_issues");
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn tools_list_returns_manifest_in_registration_order() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server.send(json!({"id": "m", "method": "tools/list"})).await;
    let response = server.recv_expecting(json!("m")).await;

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "list_issues",
            "get_issue",
            "add_issue_comment",
            "list_pull_requests",
            "get_pull_request",
            "current_repository",
            "auth_status",
        ]
    );
}

#[tokio::test]
async fn list_issues_happy_path_is_correlated_and_paginated() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api.clone()), default_config());

    server
        .send(json!({
            "id": 1,
            "method": "list_issues",
            "params": {"repository": "acme/widgets", "limit": 15, "offset": 0}
        }))
        .await;
    let response = server.recv_expecting(json!(1)).await;

    assert!(response.get("error").is_none());
    let result = &response["result"];
    assert_eq!(result["issues"].as_array().unwrap().len(), 2);
    assert_eq!(result["issues"][0]["number"], 12);
    assert_eq!(result["pagination"], json!({"limit": 15, "offset": 0}));
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn unknown_tool_answers_tool_not_found_without_side_effects() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api.clone()), default_config());

    server
        .send(json!({"id": 2, "method": "frobnicate", "params": {}}))
        .await;
    let response = server.recv_expecting(json!(2)).await;

    assert_eq!(response["error"]["kind"], "ToolNotFound");
    assert!(response.get("result").is_none());
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn malformed_repository_fails_validation_before_the_handler() {
    let api = FakeApi::new();
    let checker = FakeChecker::new(CheckerBehavior::Accept);
    let mut server = TestServer::spawn(
        services(api.clone(), FakeProbe::github(), checker.clone(), Some("ghp_valid")),
        default_config(),
    );

    server
        .send(json!({
            "id": 2,
            "method": "list_issues",
            "params": {"repository": "bad-format"}
        }))
        .await;
    let response = server.recv_expecting(json!(2)).await;

    assert_eq!(response["error"]["kind"], "ValidationError");
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("owner/repo"));
    // Handler body never entered: no API call, not even an auth check.
    assert_eq!(api.call_count(), 0);
    assert_eq!(checker.call_count(), 0);
}

#[tokio::test]
async fn out_of_range_limit_names_the_parameter() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server
        .send(json!({
            "id": 3,
            "method": "list_issues",
            "params": {"repository": "acme/widgets", "limit": 500}
        }))
        .await;
    let response = server.recv_expecting(json!(3)).await;

    assert_eq!(response["error"]["kind"], "ValidationError");
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("limit"));
    assert!(message.contains("500"));
}

#[tokio::test]
async fn missing_credential_fails_auth_missing_with_no_outbound_call() {
    let api = FakeApi::new();
    let checker = FakeChecker::new(CheckerBehavior::Accept);
    let mut server = TestServer::spawn(
        services(api.clone(), FakeProbe::github(), checker.clone(), None),
        default_config(),
    );

    server
        .send(json!({
            "id": 4,
            "method": "list_issues",
            "params": {"repository": "acme/widgets"}
        }))
        .await;
    let response = server.recv_expecting(json!(4)).await;

    assert_eq!(response["error"]["kind"], "AuthMissing");
    assert_eq!(api.call_count(), 0);
    assert_eq!(checker.call_count(), 0);
}

#[tokio::test]
async fn rejected_and_unreachable_credentials_are_distinct() {
    for (behavior, expected_kind) in [
        (CheckerBehavior::Reject, "AuthInvalid"),
        (CheckerBehavior::Unreachable, "AuthUnreachable"),
    ] {
        let api = FakeApi::new();
        let mut server = TestServer::spawn(
            services(
                api.clone(),
                FakeProbe::github(),
                FakeChecker::new(behavior),
                Some("ghp_sometoken"),
            ),
            default_config(),
        );

        server
            .send(json!({
                "id": 5,
                "method": "list_issues",
                "params": {"repository": "acme/widgets"}
            }))
            .await;
        let response = server.recv_expecting(json!(5)).await;

        assert_eq!(response["error"]["kind"], expected_kind);
        assert_eq!(api.call_count(), 0);
        // The raw token never leaks into the error text.
        assert!(!response.to_string().contains("ghp_sometoken"));
    }
}

#[tokio::test]
async fn current_repository_resolves_from_the_working_directory() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server
        .send(json!({"id": 6, "method": "current_repository", "params": {}}))
        .await;
    let response = server.recv_expecting(json!(6)).await;

    let result = &response["result"];
    assert_eq!(result["repository"], "acme/widgets");
    assert_eq!(result["owner"], "acme");
    assert_eq!(result["remote_url"], "git@github.com:acme/widgets.git");
}

#[tokio::test]
async fn current_repository_end_to_end_over_a_real_git_dir() {
    use forgelink_auth::AuthValidator;
    use forgelink_mcp::context::Services;
    use forgelink_repo_context::{GitDirProbe, RepoContextResolver};
    use std::sync::Arc;

    let temp = tempfile::TempDir::new().unwrap();
    tokio::fs::create_dir_all(temp.path().join(".git")).await.unwrap();
    tokio::fs::write(
        temp.path().join(".git/config"),
        "[remote \"origin\"]\n\turl = https://github.com/acme/widgets.git\n",
    )
    .await
    .unwrap();

    let services = Arc::new(Services {
        repo_resolver: RepoContextResolver::new(
            Arc::new(GitDirProbe::default()),
            "github.com",
            Duration::from_secs(300),
        ),
        auth: AuthValidator::new(
            FakeChecker::new(CheckerBehavior::Accept),
            Some("ghp_valid".to_string()),
            Duration::from_secs(300),
            Duration::from_millis(200),
        ),
        api: FakeApi::new(),
        workdir: temp.path().to_path_buf(),
    });
    let mut server = TestServer::spawn(services, default_config());

    server
        .send(json!({"id": 20, "method": "current_repository", "params": {}}))
        .await;
    let response = server.recv_expecting(json!(20)).await;
    assert_eq!(response["result"]["repository"], "acme/widgets");
    assert_eq!(
        response["result"]["remote_url"],
        "https://github.com/acme/widgets.git"
    );
}

#[tokio::test]
async fn repository_detection_failures_are_specific() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(
        services(
            api,
            FakeProbe::failing(forgelink_repo_context::ContextError::NoRemote {
                remote: "origin".into(),
            }),
            FakeChecker::new(CheckerBehavior::Accept),
            Some("ghp_valid"),
        ),
        default_config(),
    );

    server
        .send(json!({"id": 7, "method": "current_repository", "params": {}}))
        .await;
    let response = server.recv_expecting(json!(7)).await;

    assert_eq!(response["error"]["kind"], "NoRemote");
    assert!(response["error"]["message"].as_str().unwrap().contains("origin"));
}

#[tokio::test]
async fn capacity_one_admits_in_arrival_order() {
    let api = FakeApi::slow(Duration::from_millis(100));
    let mut server = TestServer::spawn(
        happy_services(api),
        config(1, Duration::from_secs(5)),
    );

    server
        .send(json!({
            "id": 3,
            "method": "list_issues",
            "params": {"repository": "acme/widgets"}
        }))
        .await;
    server
        .send(json!({"id": 4, "method": "current_repository", "params": {}}))
        .await;

    // With one execution slot the fast tool cannot overtake the slow one.
    let first = server.recv().await.unwrap();
    let second = server.recv().await.unwrap();
    assert_eq!(first["id"], 3);
    assert_eq!(second["id"], 4);
    assert!(first.get("result").is_some());
    assert!(second.get("result").is_some());
}

#[tokio::test]
async fn responses_may_complete_out_of_order_but_stay_correlated() {
    let api = FakeApi::slow(Duration::from_millis(100));
    let mut server = TestServer::spawn(
        happy_services(api),
        config(4, Duration::from_secs(5)),
    );

    server
        .send(json!({
            "id": 5,
            "method": "list_issues",
            "params": {"repository": "acme/widgets"}
        }))
        .await;
    server
        .send(json!({"id": 6, "method": "current_repository", "params": {}}))
        .await;

    // The fast tool finishes first; each response still matches its own id.
    let first = server.recv().await.unwrap();
    let second = server.recv().await.unwrap();
    assert_eq!(first["id"], 6);
    assert!(first.get("result").is_some());
    assert_eq!(second["id"], 5);
    assert!(second["result"]["issues"].is_array());
}

#[tokio::test]
async fn slow_handlers_time_out_with_a_timeout_envelope() {
    let api = FakeApi::slow(Duration::from_millis(500));
    let mut server = TestServer::spawn(
        happy_services(api),
        config(8, Duration::from_millis(50)),
    );

    server
        .send(json!({
            "id": 8,
            "method": "list_issues",
            "params": {"repository": "acme/widgets"}
        }))
        .await;
    let response = server.recv_expecting(json!(8)).await;

    assert_eq!(response["error"]["kind"], "Timeout");
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("list_issues"));
}

#[tokio::test]
async fn string_ids_are_echoed_verbatim() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server
        .send(json!({"id": "req-9", "method": "auth_status", "params": {}}))
        .await;
    let response = server.recv_expecting(json!("req-9")).await;
    assert_eq!(response["result"]["configured"], true);
    assert_eq!(response["result"]["valid"], true);
}

#[tokio::test]
async fn unusable_id_gets_a_null_id_validation_error_and_the_connection_survives() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server
        .send(json!({"id": [1, 2], "method": "auth_status", "params": {}}))
        .await;
    let response = server.recv().await.unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["kind"], "ValidationError");

    // Same connection keeps serving.
    server.send(json!({"id": 10, "method": "tools/list"})).await;
    let response = server.recv_expecting(json!(10)).await;
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn envelope_without_method_is_a_validation_error_not_a_disconnect() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server.send(json!({"id": 11})).await;
    let response = server.recv_expecting(json!(11)).await;
    assert_eq!(response["error"]["kind"], "ValidationError");

    server.send(json!({"id": 12, "method": "tools/list"})).await;
    let response = server.recv_expecting(json!(12)).await;
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn non_json_frame_terminates_the_connection() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    server.send_raw(b"this is not json\n").await;
    assert!(server.recv().await.is_none());
}

mod panic_tool {
    use async_trait::async_trait;
    use forgelink_mcp::context::ExecutionContext;
    use forgelink_mcp::error::ToolError;
    use forgelink_mcp::registry::Tool;
    use schemars::JsonSchema;
    use serde::Deserialize;

    pub struct PanicTool;

    #[derive(Debug, Deserialize, JsonSchema)]
    pub struct PanicParams {}

    #[async_trait]
    impl Tool for PanicTool {
        type Params = PanicParams;
        type Output = ();

        fn name(&self) -> &'static str {
            "explode"
        }

        fn description(&self) -> &'static str {
            "test-only tool that panics"
        }

        async fn run(
            &self,
            _params: Self::Params,
            _ctx: &ExecutionContext,
        ) -> Result<Self::Output, ToolError> {
            panic!("secret internal detail that must not leak");
        }
    }
}

#[tokio::test]
async fn handler_panics_become_opaque_internal_faults() {
    use forgelink_mcp::registry::{descriptor, ToolRegistry};
    use std::sync::Arc;

    let mut registry = ToolRegistry::new();
    registry.register(descriptor(panic_tool::PanicTool)).unwrap();

    let api = FakeApi::new();
    let mut server = TestServer::spawn_with_registry(
        Arc::new(registry),
        happy_services(api),
        default_config(),
    );

    server.send(json!({"id": 13, "method": "explode", "params": {}})).await;
    let response = server.recv_expecting(json!(13)).await;

    assert_eq!(response["error"]["kind"], "InternalFault");
    assert_eq!(response["error"]["message"], "internal error");
    assert!(!response.to_string().contains("secret internal detail"));

    // The dispatch loop survives the fault.
    server.send(json!({"id": 14, "method": "tools/list"})).await;
    let response = server.recv_expecting(json!(14)).await;
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn every_response_is_result_xor_error() {
    let api = FakeApi::new();
    let mut server = TestServer::spawn(happy_services(api), default_config());

    let requests = [
        json!({"id": 1, "method": "list_issues", "params": {"repository": "acme/widgets"}}),
        json!({"id": 2, "method": "nope", "params": {}}),
        json!({"id": 3, "method": "list_issues", "params": {"repository": "bad"}}),
        json!({"id": 4, "method": "tools/list"}),
    ];
    for request in requests {
        server.send(request).await;
    }
    for _ in 0..4 {
        let response = server.recv().await.unwrap();
        let has_result = response.get("result").is_some();
        let has_error = response.get("error").is_some();
        assert!(has_result ^ has_error, "bad envelope: {response}");
    }
}
