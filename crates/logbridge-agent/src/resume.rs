//! Live session supervisor - reconnect loop with timestamp-based resume.
//!
//! A live (follow) session survives channel drops: every attempt records the
//! timestamp of the last delivered line, and each reconnect re-requests logs
//! from just before that point. The principal may see a short overlap and
//! deduplicates nothing; duplicate lines are the accepted cost of no gaps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use logbridge_core::{Backoff, BackoffPolicy, BridgeError, ErrorKind, LogRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::ConnectionState;
use crate::source::LogSource;
use crate::stream::{probe, stream_live, terminal};
use crate::transport::LogStreamTransport;

/// How long a session waits for connectivity to return after an auth
/// failure before giving up.
pub const AUTH_WAIT_WINDOW: Duration = Duration::from_secs(10);

/// Poll interval while waiting for connectivity.
pub const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

enum LiveState {
    Connecting,
    WaitingForAuth,
    Reconnecting(Duration),
    Done,
}

pub struct LiveSession {
    pub transport: Arc<dyn LogStreamTransport>,
    pub source: Arc<dyn LogSource>,
    pub connection: ConnectionState,
    pub backoff: BackoffPolicy,
    pub auth_wait: Duration,
    pub auth_poll: Duration,
}

impl LiveSession {
    pub fn new(
        transport: Arc<dyn LogStreamTransport>,
        source: Arc<dyn LogSource>,
        connection: ConnectionState,
    ) -> Self {
        Self {
            transport,
            source,
            connection,
            backoff: BackoffPolicy::default(),
            auth_wait: AUTH_WAIT_WINDOW,
            auth_poll: AUTH_POLL_INTERVAL,
        }
    }

    /// Drive the session until it ends for good: cancellation, an
    /// intentional stop from the principal, or an exhausted retry budget.
    pub async fn run(self, token: CancellationToken, req: LogRequest) {
        let mut cursor: Option<DateTime<Utc>> = None;
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut state = LiveState::Connecting;

        loop {
            state = match state {
                LiveState::Connecting => {
                    let attempt_req = match cursor {
                        Some(ts) => req.resume_from(ts),
                        None => req.clone(),
                    };
                    match self.attempt(&token, &attempt_req, &mut cursor).await {
                        Ok(()) => {
                            info!(uuid = %req.uuid, "live log session ended");
                            LiveState::Done
                        }
                        Err(err) => match err.kind {
                            ErrorKind::Cancelled | ErrorKind::NotFound => {
                                info!(uuid = %req.uuid, reason = %err, "live log session stopped");
                                LiveState::Done
                            }
                            ErrorKind::Unauthenticated | ErrorKind::PermissionDenied => {
                                warn!(uuid = %req.uuid, error = %err, "live session lost authentication");
                                self.connection.set_connected(false);
                                LiveState::WaitingForAuth
                            }
                            _ => match backoff.next() {
                                Some(delay) => {
                                    debug!(
                                        uuid = %req.uuid,
                                        error = %err,
                                        delay_ms = delay.as_millis() as u64,
                                        "live session error; will reconnect"
                                    );
                                    LiveState::Reconnecting(delay)
                                }
                                None => {
                                    warn!(uuid = %req.uuid, error = %err, "retry budget exhausted; giving up");
                                    LiveState::Done
                                }
                            },
                        },
                    }
                }
                LiveState::WaitingForAuth => {
                    match self.wait_for_connection(&token).await {
                        true => {
                            backoff.reset();
                            LiveState::Connecting
                        }
                        false => LiveState::Done,
                    }
                }
                LiveState::Reconnecting(delay) => {
                    tokio::select! {
                        _ = token.cancelled() => LiveState::Done,
                        _ = tokio::time::sleep(delay) => LiveState::Connecting,
                    }
                }
                LiveState::Done => break,
            };
        }
    }

    /// One connection attempt: open a sink, stream until the channel or the
    /// source fails, then close and let the principal's status override the
    /// local view of how it ended.
    async fn attempt(
        &self,
        token: &CancellationToken,
        req: &LogRequest,
        cursor: &mut Option<DateTime<Utc>>,
    ) -> Result<(), BridgeError> {
        let mut sink = self.transport.open().await?;

        if let Err(err) = sink.send(probe(req.uuid)).await {
            // the close status carries the real failure when the channel died
            return match sink.close_and_recv().await {
                Ok(_) => Err(err),
                Err(cerr) => Err(cerr),
            };
        }

        let source = match self.source.open(req).await {
            Ok(source) => source,
            Err(err) => {
                let _ = sink.send(terminal(req.uuid, Some(&err.message))).await;
                let _ = sink.close_and_recv().await;
                return Err(err);
            }
        };

        let run = stream_live(token, sink.as_mut(), source, req, cursor).await;

        match run {
            // stream_live only returns on failure or cancellation
            Err(err) if err.kind == ErrorKind::Cancelled => {
                let _ = sink.send(terminal(req.uuid, None)).await;
                let _ = sink.close_and_recv().await;
                Err(err)
            }
            Err(err) => match sink.close_and_recv().await {
                // principal acked cleanly, so the local error was the
                // channel winding down; treat the session as complete
                Ok(_) => {
                    debug!(uuid = %req.uuid, error = %err, "close acked; ignoring local error");
                    Ok(())
                }
                Err(cerr) => Err(cerr),
            },
            Ok(()) => Ok(()),
        }
    }

    /// Poll connectivity until it returns, the window closes, or the session
    /// is cancelled. Returns whether streaming should resume.
    async fn wait_for_connection(&self, token: &CancellationToken) -> bool {
        let deadline = tokio::time::Instant::now() + self.auth_wait;
        loop {
            if self.connection.is_connected() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(self.auth_poll) => {}
            }
        }
    }
}
