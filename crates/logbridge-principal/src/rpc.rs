//! Streaming RPC service - receives chunked log data from agents.
//!
//! One inbound stream per log session. Every message is relayed to the
//! registered writer; the final acknowledgment tells the agent how the
//! principal saw the session end.

use logbridge_proto::{LogStreamAck, LogStreamData, LogStreamService};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::{LogStreamRegistry, RelayError};

pub struct LogStreamServer {
    registry: LogStreamRegistry,
}

impl LogStreamServer {
    pub fn new(registry: LogStreamRegistry) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl LogStreamService for LogStreamServer {
    async fn stream_logs(
        &self,
        request: Request<Streaming<LogStreamData>>,
    ) -> Result<Response<LogStreamAck>, Status> {
        let mut inbound = request.into_inner();
        let mut session_uuid: Option<Uuid> = None;
        let mut cancel: Option<CancellationToken> = None;
        let mut lines_received: i32 = 0;

        loop {
            // once the session is known, unregistration must interrupt the
            // read: an idle tail sends nothing for the relay to bounce
            let next = match &cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        debug!(uuid = ?session_uuid, "client disconnected; cancelling agent stream");
                        return Err(Status::cancelled("log consumer went away"));
                    }
                    res = inbound.message() => res?,
                },
                None => inbound.message().await?,
            };
            let Some(msg) = next else {
                break;
            };

            let uuid = Uuid::parse_str(&msg.request_uuid)
                .map_err(|_| Status::invalid_argument("malformed request uuid"))?;

            match session_uuid {
                None => {
                    debug!(uuid = %uuid, "log stream opened");
                    session_uuid = Some(uuid);
                }
                Some(expected) if expected != uuid => {
                    return Err(Status::invalid_argument(
                        "request uuid changed mid-stream",
                    ));
                }
                Some(_) => {}
            }

            if !msg.data.is_empty() {
                lines_received += msg.data.matches('\n').count() as i32;
            }

            match self.registry.relay(uuid, &msg).await {
                Ok(()) => {}
                Err(RelayError::NotRegistered) => {
                    warn!(uuid = %uuid, "chunk for unknown log request");
                    return Err(Status::not_found("no pending log request"));
                }
                Err(RelayError::ClientGone) => {
                    debug!(uuid = %uuid, "client disconnected; cancelling agent stream");
                    return Err(Status::cancelled("log consumer went away"));
                }
                Err(RelayError::LimitExceeded) => {
                    warn!(uuid = %uuid, "static body limit reached; stopping agent stream");
                    return Err(Status::cancelled("log output limit reached"));
                }
            }

            if cancel.is_none() {
                cancel = self.registry.cancellation(&uuid);
            }
        }

        let uuid = session_uuid
            .map(|u| u.to_string())
            .unwrap_or_default();
        debug!(uuid = %uuid, lines = lines_received, "log stream closed");

        Ok(Response::new(LogStreamAck {
            request_uuid: uuid,
            status: 200,
            lines_received,
        }))
    }
}
