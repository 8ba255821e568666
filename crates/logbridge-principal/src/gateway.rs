//! HTTP gateway - Kubernetes-compatible pod log endpoint.
//!
//! `GET /api/v1/namespaces/{namespace}/pods/{pod}/log` with the usual pod
//! log query parameters. The caller's certificate identity names the owning
//! agent. Static requests buffer the whole stream and answer once; follow
//! requests answer immediately with a streaming body fed chunk by chunk.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use logbridge_core::LogRequest;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::EventDispatcher;
use crate::registry::{Framing, LogStreamRegistry};

/// How long a static request waits for the agent before answering with
/// whatever arrived. Not an error: slow agents produce partial output.
pub const STATIC_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Client certificate identity extracted upstream. TLS termination and
/// certificate verification happen in front of this service; the verified
/// common name arrives in the `x-ssl-client-cn` header.
#[derive(Clone, Debug)]
pub struct PeerIdentity(pub Option<String>);

pub struct AppState {
    pub registry: LogStreamRegistry,
    pub dispatcher: Arc<dyn EventDispatcher>,
    pub static_timeout: Duration,
}

impl AppState {
    pub fn new(registry: LogStreamRegistry, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
            static_timeout: STATIC_WAIT_TIMEOUT,
        }
    }
}

/// Pod log query parameters, Kubernetes style.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub container: Option<String>,
    pub follow: Option<bool>,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    pub since_time: Option<String>,
    pub timestamps: Option<bool>,
    pub previous: Option<bool>,
    #[serde(rename = "insecureSkipTLSVerifyBackend")]
    pub insecure_skip_tls_verify_backend: Option<bool>,
    pub limit_bytes: Option<i64>,
    pub pretty: Option<bool>,
    pub stream: Option<String>,
}

/// Build the request event from path and query parameters. An unparseable
/// sinceTime is ignored rather than rejected, matching the tolerant
/// handling of optional parameters.
pub fn build_log_request(namespace: &str, pod: &str, query: &LogQuery) -> LogRequest {
    let mut req = LogRequest::new(namespace, pod);
    if let Some(ref container) = query.container {
        req.container = container.clone();
    }
    req.follow = query.follow.unwrap_or(false);
    req.tail_lines = query.tail_lines;
    req.since_seconds = query.since_seconds;
    req.since_time = query
        .since_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    req.timestamps = query.timestamps.unwrap_or(false);
    req.previous = query.previous.unwrap_or(false);
    req.insecure_skip_tls_verify_backend = query.insecure_skip_tls_verify_backend.unwrap_or(false);
    req.limit_bytes = query.limit_bytes;
    req.pretty = query.pretty.unwrap_or(false);
    req.stream = query.stream.clone();
    req
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/namespaces/{namespace}/pods/{pod}/log",
            get(container_logs),
        )
        .route("/health", get(|| async { "ok" }))
        .layer(middleware::from_fn(extract_peer_identity))
        .with_state(state)
}

async fn extract_peer_identity(mut request: Request<Body>, next: Next) -> Response {
    let identity = request
        .headers()
        .get("x-ssl-client-cn")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    request.extensions_mut().insert(PeerIdentity(identity));
    next.run(request).await
}

async fn container_logs(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<PeerIdentity>,
    Path((namespace, pod)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(peer) = identity.0 else {
        return (StatusCode::UNAUTHORIZED, "client certificate required").into_response();
    };

    if namespace.trim().is_empty() || pod.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "namespace and pod are required").into_response();
    }

    // the certificate identity names the target agent; no agent, no logs
    if !state.dispatcher.is_connected(&peer) {
        return (
            StatusCode::BAD_GATEWAY,
            format!("agent {} is not connected", peer),
        )
            .into_response();
    }

    let req = build_log_request(&namespace, &pod, &query);
    info!(
        uuid = %req.uuid,
        peer = %peer,
        namespace = %namespace,
        pod = %pod,
        follow = req.follow,
        "log request"
    );

    if req.follow {
        follow_logs(state, &peer, req, headers).await
    } else {
        static_logs(state, &peer, req).await
    }
}

async fn static_logs(state: Arc<AppState>, agent: &str, req: LogRequest) -> Response {
    let uuid = req.uuid;
    // registered before dispatch so the first chunk always has a writer
    if !state.registry.register_static(uuid) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "duplicate request id").into_response();
    }

    if let Err(err) = state.dispatcher.dispatch(agent, &req).await {
        state.registry.unregister(&uuid);
        warn!(uuid = %uuid, error = %err, "failed to dispatch log request");
        return (StatusCode::BAD_GATEWAY, "failed to reach agent").into_response();
    }

    let completed = state
        .registry
        .wait_for_completion(&uuid, state.static_timeout)
        .await;
    if !completed {
        warn!(uuid = %uuid, "timed out waiting for agent; returning partial logs");
    }

    let Some((body, error)) = state.registry.take_static_body(&uuid) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "log stream lost").into_response();
    };

    // an errored stream that produced nothing is a gateway failure; if we
    // got output before the error the client still gets the output
    if body.is_empty() {
        if let Some(error) = error {
            return (StatusCode::BAD_GATEWAY, error).into_response();
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn follow_logs(
    state: Arc<AppState>,
    agent: &str,
    req: LogRequest,
    headers: HeaderMap,
) -> Response {
    let framing = if accepts_event_stream(headers) {
        Framing::EventStream
    } else {
        Framing::Raw
    };

    let uuid = req.uuid;
    let Some(rx) = state.registry.register_live(uuid, framing) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "duplicate request id").into_response();
    };

    if let Err(err) = state.dispatcher.dispatch(agent, &req).await {
        state.registry.unregister(&uuid);
        warn!(uuid = %uuid, error = %err, "failed to dispatch log request");
        return (StatusCode::BAD_GATEWAY, "failed to reach agent").into_response();
    }

    let content_type = match framing {
        Framing::Raw => "text/plain; charset=utf-8",
        Framing::EventStream => "text/event-stream",
    };

    let body = Body::from_stream(LiveBody {
        rx,
        registry: state.registry.clone(),
        uuid,
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn accepts_event_stream(headers: HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Response body for a follow request. Dropping it (client disconnect)
/// unregisters the stream, which makes the next relay fail and tells the
/// agent to stop.
struct LiveBody {
    rx: tokio::sync::mpsc::Receiver<Bytes>,
    registry: LogStreamRegistry,
    uuid: Uuid,
}

impl Stream for LiveBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for LiveBody {
    fn drop(&mut self) {
        self.registry.unregister(&self.uuid);
    }
}
