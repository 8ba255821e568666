//! Agent stream dispatcher - turns a decoded log request event into a
//! static or live streaming session, exactly once per request identifier.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use logbridge_core::{BridgeError, ErrorKind, LogRequest};
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::inflight::InflightLogs;
use crate::resume::LiveSession;
use crate::source::LogSource;
use crate::stream::{probe, stream_to_completion, terminal, EOF_GRACE};
use crate::transport::LogStreamTransport;

/// Channel connectivity flag, flipped down on auth failures and polled by
/// live sessions waiting for it to come back.
#[derive(Clone)]
pub struct ConnectionState {
    connected: Arc<AtomicBool>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Agent {
    transport: Arc<dyn LogStreamTransport>,
    source: Arc<dyn LogSource>,
    inflight: InflightLogs,
    connection: ConnectionState,
    shutdown: CancellationToken,
}

impl Agent {
    pub fn new(transport: Arc<dyn LogStreamTransport>, source: Arc<dyn LogSource>) -> Self {
        Self::with_shutdown(transport, source, CancellationToken::new())
    }

    /// Session lifetimes are children of `shutdown`: a live session outlives
    /// its dispatch call but never the agent process.
    pub fn with_shutdown(
        transport: Arc<dyn LogStreamTransport>,
        source: Arc<dyn LogSource>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            source,
            inflight: InflightLogs::new(),
            connection: ConnectionState::new(),
            shutdown,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection.clone()
    }

    pub fn is_streaming(&self, uuid: &Uuid) -> bool {
        self.inflight.contains(uuid)
    }

    pub fn active_sessions(&self) -> usize {
        self.inflight.len()
    }

    /// Cancel one running session by request identifier.
    pub fn cancel_session(&self, uuid: &Uuid) -> bool {
        self.inflight.cancel(uuid)
    }

    /// Handle one log request event. Idempotent on the request identifier:
    /// a duplicate dispatch while the first session is active is a logged
    /// no-op returning success.
    ///
    /// Static requests run synchronously and propagate their error. Live
    /// requests detach; after launch this returns success immediately and
    /// failures are only observable through the streaming channel.
    pub async fn process_log_request(&self, req: LogRequest) -> Result<(), BridgeError> {
        info!(
            uuid = %req.uuid,
            namespace = %req.namespace,
            pod = %req.pod,
            container = %req.container,
            follow = req.follow,
            "processing log request"
        );

        // only GET requests reach the log subresource
        if !req.method.is_empty() && req.method != "GET" {
            return Err(BridgeError::bad_request(format!(
                "unsupported method {}",
                req.method
            )));
        }

        let token = self.shutdown.child_token();
        let Some(guard) = self.inflight.insert(req.uuid, token.clone()) else {
            warn!(uuid = %req.uuid, "duplicate log request; already streaming");
            return Ok(());
        };

        if req.follow {
            let session = LiveSession::new(
                self.transport.clone(),
                self.source.clone(),
                self.connection.clone(),
            );
            tokio::spawn(async move {
                let _guard = guard; // entry lives for the whole session
                let run = AssertUnwindSafe(session.run(token, req)).catch_unwind();
                if let Err(payload) = run.await {
                    error!(panic = %panic_message(payload), "panic in live log streaming");
                }
            });
            // early acknowledgment; the dispatch is not held open for a tail
            return Ok(());
        }

        let result = self.handle_static(&token, &req).await;
        drop(guard);
        if let Err(ref err) = result {
            error!(uuid = %req.uuid, error = %err, "log processing failed");
        }
        result
    }

    async fn handle_static(
        &self,
        token: &CancellationToken,
        req: &LogRequest,
    ) -> Result<(), BridgeError> {
        let mut sink = self.transport.open().await?;

        sink.send(probe(req.uuid)).await?;

        let source = match self.source.open(req).await {
            Ok(source) => source,
            Err(err) => {
                let _ = sink.send(terminal(req.uuid, Some(&err.message))).await;
                let _ = sink.close_and_recv().await;
                return Err(err);
            }
        };

        let mut result = stream_to_completion(token, sink.as_mut(), source, req).await;

        // let the principal observe the final frame before the channel closes
        tokio::time::sleep(EOF_GRACE).await;

        if let Err(cerr) = sink.close_and_recv().await {
            result = Err(cerr);
        }

        if let Err(ref err) = result {
            match err.kind {
                // intentional stop; do not retry, do not touch connectivity
                ErrorKind::Cancelled | ErrorKind::NotFound => {}
                ErrorKind::Unauthenticated | ErrorKind::PermissionDenied => {
                    warn!(uuid = %req.uuid, error = %err, "auth/permission failure");
                    self.connection.set_connected(false);
                }
                _ => warn!(uuid = %req.uuid, error = %err, "stream error"),
            }
        }

        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
