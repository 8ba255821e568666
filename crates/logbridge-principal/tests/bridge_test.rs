//! End-to-end: a real agent streaming over a real tonic channel into the
//! principal's registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logbridge_agent::source::{LogByteStream, LogSource};
use logbridge_agent::{Agent, GrpcLogStreamTransport};
use logbridge_core::{BridgeError, LogRequest};
use logbridge_principal::registry::{Framing, LogStreamRegistry};
use logbridge_principal::LogStreamServer;
use logbridge_proto::LogStreamServiceServer;
use tokio_stream::wrappers::TcpListenerStream;

struct StaticSource {
    text: String,
}

#[async_trait]
impl LogSource for StaticSource {
    async fn open(&self, _req: &LogRequest) -> Result<LogByteStream, BridgeError> {
        Ok(Box::new(std::io::Cursor::new(self.text.clone().into_bytes())))
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn start_principal(registry: LogStreamRegistry) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(LogStreamServiceServer::new(LogStreamServer::new(registry)))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_agent_streams_static_logs_into_registry() {
    let registry = LogStreamRegistry::new();
    let endpoint = start_principal(registry.clone()).await;

    let transport = Arc::new(GrpcLogStreamTransport::connect(&endpoint).unwrap());
    let text = "alpha\nbeta\ngamma\n".to_string();
    let agent = Agent::new(transport, Arc::new(StaticSource { text: text.clone() }));

    let mut req = LogRequest::new("agent-prod", "web-0");
    req.container = "app".to_string();

    // the principal registers the writer before the event reaches the agent
    assert!(registry.register_static(req.uuid));

    agent.process_log_request(req.clone()).await.unwrap();

    assert!(
        registry
            .wait_for_completion(&req.uuid, Duration::from_secs(5))
            .await
    );
    let (body, error) = registry.take_static_body(&req.uuid).unwrap();
    assert_eq!(String::from_utf8(body).unwrap(), text);
    assert!(error.is_none());
}

#[tokio::test]
async fn test_agent_error_reaches_registry() {
    let registry = LogStreamRegistry::new();
    let endpoint = start_principal(registry.clone()).await;

    struct FailingSource;

    #[async_trait]
    impl LogSource for FailingSource {
        async fn open(&self, _req: &LogRequest) -> Result<LogByteStream, BridgeError> {
            Err(BridgeError::source_unavailable("pod \"web-0\" not found"))
        }
    }

    let transport = Arc::new(GrpcLogStreamTransport::connect(&endpoint).unwrap());
    let agent = Agent::new(transport, Arc::new(FailingSource));

    let req = LogRequest::new("agent-prod", "web-0");
    assert!(registry.register_static(req.uuid));

    let err = agent.process_log_request(req.clone()).await.unwrap_err();
    assert!(err.message.contains("not found"));

    assert!(
        registry
            .wait_for_completion(&req.uuid, Duration::from_secs(5))
            .await
    );
    let (body, error) = registry.take_static_body(&req.uuid).unwrap();
    assert!(body.is_empty());
    assert_eq!(error.as_deref(), Some("pod \"web-0\" not found"));
}

#[tokio::test]
async fn test_idle_live_tail_ends_on_client_disconnect() {
    let registry = LogStreamRegistry::new();
    let endpoint = start_principal(registry.clone()).await;

    // source that stays open without ever producing a line
    struct SilentSource {
        writers: std::sync::Mutex<Vec<tokio::io::DuplexStream>>,
    }

    #[async_trait]
    impl LogSource for SilentSource {
        async fn open(&self, _req: &LogRequest) -> Result<LogByteStream, BridgeError> {
            let (reader, writer) = tokio::io::duplex(4096);
            self.writers.lock().unwrap().push(writer);
            Ok(Box::new(reader))
        }
    }

    let transport = Arc::new(GrpcLogStreamTransport::connect(&endpoint).unwrap());
    let agent = Agent::new(
        transport,
        Arc::new(SilentSource {
            writers: std::sync::Mutex::new(Vec::new()),
        }),
    );

    let mut req = LogRequest::new("agent-prod", "web-0");
    req.follow = true;

    let rx = registry.register_live(req.uuid, Framing::Raw).unwrap();
    agent.process_log_request(req.clone()).await.unwrap();
    wait_until(|| agent.is_streaming(&req.uuid)).await;

    // client goes away with no data in flight: body drop unregisters,
    // which must still reach the blocked agent stream and end the session
    drop(rx);
    registry.unregister(&req.uuid);

    wait_until(|| agent.active_sessions() == 0).await;
    assert!(!registry.is_registered(&req.uuid));
}

#[tokio::test]
async fn test_stream_without_registration_is_rejected() {
    let registry = LogStreamRegistry::new();
    let endpoint = start_principal(registry).await;

    let transport = Arc::new(GrpcLogStreamTransport::connect(&endpoint).unwrap());
    let agent = Agent::new(
        transport,
        Arc::new(StaticSource {
            text: "orphan\n".to_string(),
        }),
    );

    // nobody registered this uuid on the principal side
    let req = LogRequest::new("agent-prod", "web-0");
    let err = agent.process_log_request(req).await.unwrap_err();
    assert_eq!(err.kind, logbridge_core::ErrorKind::NotFound);
}
