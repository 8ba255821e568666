//! Log source adapter - opens the raw byte stream for a pod/container.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, LogParams};
use logbridge_core::{BridgeError, ErrorKind, LogRequest};
use tokio::io::AsyncRead;
use tokio_util::compat::FuturesAsyncReadCompatExt;

pub type LogByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Everything above this trait treats the cluster as an external
/// collaborator; tests plug in in-memory readers.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn open(&self, req: &LogRequest) -> Result<LogByteStream, BridgeError>;
}

/// Kubernetes-backed source using the pod log subresource.
pub struct KubeLogSource {
    client: kube::Client,
}

impl KubeLogSource {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogSource for KubeLogSource {
    async fn open(&self, req: &LogRequest) -> Result<LogByteStream, BridgeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &req.namespace);
        let params = LogParams {
            container: (!req.container.is_empty()).then(|| req.container.clone()),
            follow: req.follow,
            // timestamps are forced on: the live resume cursor needs them
            timestamps: true,
            previous: req.previous,
            tail_lines: req.tail_lines,
            since_seconds: req.since_seconds,
            since_time: req.since_time,
            limit_bytes: req.limit_bytes,
            pretty: req.pretty,
        };

        let stream = pods
            .log_stream(&req.pod, &params)
            .await
            .map_err(|e| BridgeError::new(ErrorKind::SourceUnavailable, e.to_string()))?;

        // kube hands back a futures-io reader; the streaming loops read tokio
        Ok(Box::new(Box::pin(stream).compat()))
    }
}
