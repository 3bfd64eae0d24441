#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Wire-contract tests for the HTTP Control Plane client against a local
//! mock server.

use kilu_hub::config::ControlPlaneConfig;
use kilu_hub::control_plane::{AssumptionItem, SubmitOutcome, TaskResult};
use kilu_hub::hashing::ContentHashes;
use kilu_hub::{ControlPlane, ControlPlaneError, HttpControlPlane, SessionStore};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "hub-session-token";

fn client(server: &MockServer) -> HttpControlPlane {
    let config = ControlPlaneConfig {
        base_url: server.uri(),
        allow_insecure: true,
        request_timeout_secs: 5,
        ..Default::default()
    };
    let session = Arc::new(SessionStore::in_memory(Some(TOKEN.to_owned())));
    HttpControlPlane::new(config, session).expect("client")
}

fn result_for(url: &str) -> TaskResult {
    TaskResult {
        url: url.to_owned(),
        extracted_text: "body".into(),
        headings: vec!["Intro".into()],
        summary: "Successfully extracted 4 characters and 1 headings.".into(),
        facts: vec!["Heading Extracted: Intro".into()],
        hashes: ContentHashes::compute("body", &["Intro".to_owned()]),
    }
}

#[tokio::test]
async fn poll_sends_bearer_and_max() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/hub/queue"))
        .and(query_param("max", "1"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "task_id": "task-0001",
                "grant_id": "grant-1",
                "external_url": "https://example.com/a",
                "expires_at": "2026-10-18T12:00:00Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = client(&server).poll_queue(1).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, "task-0001");
    assert_eq!(tasks[0].grant_id, "grant-1");
    assert!(tasks[0].lease_expires_at.is_some());
}

#[tokio::test]
async fn poll_accepts_wrapped_items_and_drops_malformed_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/hub/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "task_id": "no-url", "grant_id": "g" },
                { "task_id": "no-grant", "external_url": "https://example.com" },
                {
                    "task_id": "fallback-grant",
                    "active_grant_id": "g-active",
                    "external_url": "https://example.com/b"
                }
            ]
        })))
        .mount(&server)
        .await;

    let tasks = client(&server).poll_queue(1).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, "fallback-grant");
    assert_eq!(tasks[0].grant_id, "g-active");
}

#[tokio::test]
async fn empty_queue_body_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/hub/queue"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert!(client(&server).poll_queue(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_session_maps_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/hub/queue"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).poll_queue(1).await.unwrap_err();
    assert_eq!(
        err,
        ControlPlaneError::Unauthorized("Unauthorized: Session expired or invalid.".into())
    );
}

#[tokio::test]
async fn mint_posts_size_under_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/grants/grant-1/mint-step-batch"))
        .and(body_json(json!({ "size": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batch_id": "b-1",
            "size": 1,
            "issued_at": "2026-10-18T12:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = client(&server).mint_step_batch("grant-1", 1).await.unwrap();
    assert_eq!(batch.unwrap().batch_id, "b-1");
}

#[tokio::test]
async fn mint_success_is_decided_by_status_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/grants/no-content/mint-step-batch"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/grants/empty-object/mint-step-batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/grants/other-shape/mint-step-batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let cp = client(&server);
    for grant in ["no-content", "empty-object", "other-shape"] {
        let batch = cp.mint_step_batch(grant, 1).await;
        assert!(
            matches!(batch, Ok(None)),
            "grant {grant} should be authorized without a batch, got {batch:?}"
        );
    }
}

#[tokio::test]
async fn mint_quota_statuses_map_to_quota() {
    for status in [403_u16, 429] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/grants/g/mint-step-batch"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({ "error": "quota exhausted" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).mint_step_batch("g", 1).await.unwrap_err();
        match err {
            ControlPlaneError::Quota(message) => assert!(message.ends_with("quota exhausted")),
            other => panic!("expected quota error for {status}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn mint_server_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/grants/g/mint-step-batch"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).mint_step_batch("g", 1).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(
        err.to_string(),
        "Server Error (500): Failed to parse server error format."
    );
}

#[tokio::test]
async fn lease_refresh_posts_task_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/hub/lease/refresh"))
        .and(body_json(json!({ "task_id": "task-0001" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).refresh_lease("task-0001").await.unwrap();
}

#[tokio::test]
async fn submit_accepts_and_treats_conflict_as_duplicate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/fresh/result"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/seen/result"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let cp = client(&server);
    let result = result_for("https://example.com/a");
    assert_eq!(
        cp.submit_result("fresh", &result).await.unwrap(),
        SubmitOutcome::Accepted
    );
    assert_eq!(
        cp.submit_result("seen", &result).await.unwrap(),
        SubmitOutcome::Duplicate
    );
}

#[tokio::test]
async fn submit_body_carries_prefixed_hashes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/t1/result"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    client(&server)
        .submit_result("t1", &result_for("https://example.com/a"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["url"], "https://example.com/a");
    assert!(
        body["hashes"]["text_hash"]
            .as_str()
            .unwrap()
            .starts_with("sha256:")
    );
    assert_eq!(body["facts"][0], "Heading Extracted: Intro");
}

#[tokio::test]
async fn assumptions_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/t1/assumptions/request"))
        .and(body_json(json!({
            "assumptions": [
                { "key": "security_heuristic", "question": "Execution blocked: Found password input field" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let item = AssumptionItem {
        key: "security_heuristic".into(),
        question: "Execution blocked: Found password input field".into(),
    };
    client(&server)
        .request_assumptions("t1", &[item])
        .await
        .unwrap();
}

#[tokio::test]
async fn error_envelope_message_wins_over_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks/t1/assumptions/request"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "bad_request",
            "message": "assumption key unknown"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .request_assumptions("t1", &[])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid Request: assumption key unknown");
}

#[tokio::test]
async fn unreachable_control_plane_is_a_transport_error() {
    let config = ControlPlaneConfig {
        base_url: "http://127.0.0.1:9".into(),
        allow_insecure: true,
        request_timeout_secs: 2,
        ..Default::default()
    };
    let cp = HttpControlPlane::new(config, Arc::new(SessionStore::in_memory(Some(TOKEN.into()))))
        .unwrap();
    assert!(matches!(
        cp.poll_queue(1).await,
        Err(ControlPlaneError::Transport(_))
    ));
}
