use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use logbridge_core::{BridgeError, LogRequest};
use logbridge_principal::gateway::{build_log_request, router, AppState, LogQuery};
use logbridge_principal::registry::LogStreamRegistry;
use logbridge_principal::EventDispatcher;
use logbridge_proto::LogStreamData;
use tower::ServiceExt;

/// Dispatcher that plays the agent: on dispatch it relays scripted chunks
/// straight back into the registry.
struct MockDispatcher {
    registry: LogStreamRegistry,
    connected: bool,
    chunks: Vec<(String, bool, String)>, // (data, eof, error)
    dispatched: Mutex<Vec<LogRequest>>,
}

impl MockDispatcher {
    fn agent_with_output(registry: LogStreamRegistry, lines: &str) -> Self {
        Self {
            registry,
            connected: true,
            chunks: vec![
                (String::new(), false, String::new()), // probe
                (lines.to_string(), false, String::new()),
                (String::new(), true, String::new()),
            ],
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn agent_with_error(registry: LogStreamRegistry, error: &str) -> Self {
        Self {
            registry,
            connected: true,
            chunks: vec![
                (String::new(), false, String::new()),
                (String::new(), true, error.to_string()),
            ],
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn disconnected(registry: LogStreamRegistry) -> Self {
        Self {
            registry,
            connected: false,
            chunks: Vec::new(),
            dispatched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventDispatcher for MockDispatcher {
    fn is_connected(&self, _agent: &str) -> bool {
        self.connected
    }

    async fn dispatch(&self, _agent: &str, req: &LogRequest) -> Result<(), BridgeError> {
        self.dispatched.lock().unwrap().push(req.clone());
        let registry = self.registry.clone();
        let uuid = req.uuid;
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for (data, eof, error) in chunks {
                let msg = LogStreamData {
                    request_uuid: uuid.to_string(),
                    data,
                    eof,
                    error,
                };
                if registry.relay(uuid, &msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

fn app(dispatcher: MockDispatcher) -> axum::Router {
    let registry = dispatcher.registry.clone();
    router(Arc::new(AppState::new(registry, Arc::new(dispatcher))))
}

fn log_uri(extra: &str) -> String {
    format!("/api/v1/namespaces/agent-prod/pods/web-0/log{extra}")
}

#[tokio::test]
async fn test_rejects_request_without_client_identity() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_output(registry, "x\n"));

    let response = app
        .oneshot(Request::get(log_uri("")).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejects_request_for_offline_agent() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::disconnected(registry));

    let response = app
        .oneshot(
            Request::get(log_uri(""))
                .header("x-ssl-client-cn", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_static_request_returns_buffered_logs() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_output(
        registry.clone(),
        "line one\nline two\n",
    ));

    let response = app
        .oneshot(
            Request::get(log_uri("?container=app&tailLines=100"))
                .header("x-ssl-client-cn", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "line one\nline two\n");
}

#[tokio::test]
async fn test_static_request_with_failed_stream_is_bad_gateway() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_error(
        registry,
        "container \"app\" not found",
    ));

    let response = app
        .oneshot(
            Request::get(log_uri(""))
                .header("x-ssl-client-cn", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "container \"app\" not found");
}

#[tokio::test]
async fn test_follow_request_streams_body() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_output(
        registry,
        "streamed line\n",
    ));

    let response = app
        .oneshot(
            Request::get(log_uri("?follow=true"))
                .header("x-ssl-client-cn", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "streamed line\n");
}

#[tokio::test]
async fn test_follow_with_event_stream_accept_header() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_output(registry, "evented\n"));

    let response = app
        .oneshot(
            Request::get(log_uri("?follow=true"))
                .header("x-ssl-client-cn", "admin")
                .header(header::ACCEPT, "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "data: evented\n\n");
}

#[tokio::test]
async fn test_non_get_method_is_rejected() {
    let registry = LogStreamRegistry::new();
    let app = app(MockDispatcher::agent_with_output(registry, "x\n"));

    let response = app
        .oneshot(
            Request::post(log_uri(""))
                .header("x-ssl-client-cn", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn test_build_log_request_maps_query_params() {
    let query = LogQuery {
        container: Some("app".to_string()),
        follow: Some(true),
        tail_lines: Some(50),
        since_seconds: Some(300),
        since_time: None,
        timestamps: Some(true),
        previous: Some(true),
        insecure_skip_tls_verify_backend: Some(true),
        limit_bytes: Some(1024),
        pretty: None,
        stream: Some("All".to_string()),
    };

    let req = build_log_request("agent-prod", "web-0", &query);
    assert_eq!(req.namespace, "agent-prod");
    assert_eq!(req.pod, "web-0");
    assert_eq!(req.container, "app");
    assert!(req.follow);
    assert_eq!(req.tail_lines, Some(50));
    assert_eq!(req.since_seconds, Some(300));
    assert!(req.timestamps);
    assert!(req.previous);
    assert!(req.insecure_skip_tls_verify_backend);
    assert_eq!(req.limit_bytes, Some(1024));
    assert_eq!(req.stream.as_deref(), Some("All"));
}

#[test]
fn test_build_log_request_parses_since_time() {
    let query = LogQuery {
        since_time: Some("2024-06-01T12:00:00Z".to_string()),
        ..Default::default()
    };
    let req = build_log_request("a", "p", &query);
    let since = req.since_time.unwrap();
    assert_eq!(since.to_rfc3339(), "2024-06-01T12:00:00+00:00");
}

#[test]
fn test_build_log_request_ignores_invalid_since_time() {
    let query = LogQuery {
        since_time: Some("yesterday".to_string()),
        ..Default::default()
    };
    let req = build_log_request("a", "p", &query);
    assert!(req.since_time.is_none());
}
