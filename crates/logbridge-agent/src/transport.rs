//! Streaming RPC channel to the principal.
//!
//! One `ChunkSink` per log session: the agent sends chunk messages and,
//! when it closes its side, receives the principal's acknowledgment. The
//! trait seam lets tests swap in recording sinks.

use async_trait::async_trait;
use logbridge_core::{BridgeError, ErrorKind};
use logbridge_proto::{LogStreamAck, LogStreamData, LogStreamServiceClient};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};

/// Agent side of one streaming session.
#[async_trait]
pub trait ChunkSink: Send {
    async fn send(&mut self, msg: LogStreamData) -> Result<(), BridgeError>;

    /// Close the outbound side and wait for the principal's acknowledgment.
    /// The returned status is authoritative for how the session ended.
    async fn close_and_recv(self: Box<Self>) -> Result<LogStreamAck, BridgeError>;

    /// Cheap liveness check so idle sessions notice a closed channel
    /// without having to send anything.
    fn is_closed(&self) -> bool;
}

/// Opens one sink per session.
#[async_trait]
pub trait LogStreamTransport: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ChunkSink>, BridgeError>;
}

/// tonic-backed transport over a shared channel to the principal.
pub struct GrpcLogStreamTransport {
    channel: Channel,
}

impl GrpcLogStreamTransport {
    /// Lazy connection: the channel dials on first use, so the agent can
    /// start before the principal is reachable.
    pub fn connect(endpoint: &str) -> Result<Self, BridgeError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| BridgeError::internal(format!("invalid principal endpoint: {e}")))?
            .connect_lazy();
        Ok(Self { channel })
    }
}

#[async_trait]
impl LogStreamTransport for GrpcLogStreamTransport {
    async fn open(&self) -> Result<Box<dyn ChunkSink>, BridgeError> {
        let mut client = LogStreamServiceClient::new(self.channel.clone());
        let (tx, rx) = mpsc::channel::<LogStreamData>(16);
        let outbound = ReceiverStream::new(rx);
        let ack = tokio::spawn(async move {
            client
                .stream_logs(tonic::Request::new(outbound))
                .await
                .map(|resp| resp.into_inner())
        });
        Ok(Box::new(GrpcChunkSink { tx: Some(tx), ack }))
    }
}

struct GrpcChunkSink {
    tx: Option<mpsc::Sender<LogStreamData>>,
    ack: JoinHandle<Result<LogStreamAck, tonic::Status>>,
}

#[async_trait]
impl ChunkSink for GrpcChunkSink {
    async fn send(&mut self, msg: LogStreamData) -> Result<(), BridgeError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(BridgeError::transient("log stream already closed"));
        };
        // a closed receiver means the RPC ended; close_and_recv surfaces the
        // real status
        tx.send(msg)
            .await
            .map_err(|_| BridgeError::transient("log stream closed by peer"))
    }

    async fn close_and_recv(mut self: Box<Self>) -> Result<LogStreamAck, BridgeError> {
        // dropping the sender ends the outbound stream so the principal acks
        self.tx.take();
        match self.ack.await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(status)) => Err(classify_status(&status)),
            Err(join_err) => Err(BridgeError::internal(join_err.to_string())),
        }
    }

    fn is_closed(&self) -> bool {
        // the receiver is dropped when the RPC task resolves
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Map a channel status onto the bridge taxonomy. Cancelled/NotFound are
/// intentional stops, auth codes trigger the wait-for-auth path, everything
/// else is transient.
pub fn classify_status(status: &tonic::Status) -> BridgeError {
    use tonic::Code;
    let kind = match status.code() {
        Code::Cancelled => ErrorKind::Cancelled,
        Code::NotFound => ErrorKind::NotFound,
        Code::Unauthenticated => ErrorKind::Unauthenticated,
        Code::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::Transient,
    };
    BridgeError::new(kind, status.message())
}
