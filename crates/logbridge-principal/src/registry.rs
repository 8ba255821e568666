//! Pending log stream registry - the rendezvous between an HTTP request
//! waiting for output and the agent stream that produces it.
//!
//! The gateway registers a writer keyed by request identifier BEFORE the
//! request event is dispatched, so the agent's first chunk always finds its
//! destination. The RPC service looks the writer up per received message;
//! an unknown identifier means the request was never made or already torn
//! down, and the sending agent is told to stop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use logbridge_proto::LogStreamData;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Chunk capacity of a live writer's channel before relay backpressure
/// reaches the agent.
pub const LIVE_BODY_CAPACITY: usize = 64;

/// Upper bound on a buffered static body. Clients wanting less pass
/// tailLines/limitBytes; this protects principal memory from the rest.
pub const MAX_STATIC_BODY: usize = 16 * 1024 * 1024;

/// How chunk payloads are framed on the way to the HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Payload bytes passed through untouched.
    Raw,
    /// Each line wrapped as a `text/event-stream` data event.
    EventStream,
}

enum Writer {
    /// Buffered until the terminal frame, then served as one response body.
    Static { body: Vec<u8> },
    /// Forwarded chunk by chunk into the response body stream.
    Live {
        tx: mpsc::Sender<Bytes>,
        framing: Framing,
    },
}

struct Registration {
    writer: Writer,
    done: watch::Sender<bool>,
    cancel: CancellationToken,
    error: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RelayError {
    /// No writer under that identifier; the sender should stop.
    NotRegistered,
    /// The HTTP client went away mid-stream.
    ClientGone,
    /// The buffered static body hit its cap; the sender should stop.
    LimitExceeded,
}

/// Shared map of in-flight log requests. Lock scope stays small: live
/// chunk delivery happens outside the lock.
#[derive(Clone)]
pub struct LogStreamRegistry {
    inner: Arc<Mutex<HashMap<Uuid, Registration>>>,
    static_body_limit: usize,
}

impl Default for LogStreamRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            static_body_limit: MAX_STATIC_BODY,
        }
    }
}

impl LogStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a custom cap on buffered static bodies.
    pub fn with_static_body_limit(limit: usize) -> Self {
        Self {
            static_body_limit: limit,
            ..Self::default()
        }
    }

    /// Register a buffering writer for a static request. Fails on a
    /// duplicate identifier.
    pub fn register_static(&self, uuid: Uuid) -> bool {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&uuid) {
            return false;
        }
        let (done, _) = watch::channel(false);
        map.insert(
            uuid,
            Registration {
                writer: Writer::Static { body: Vec::new() },
                done,
                cancel: CancellationToken::new(),
                error: None,
            },
        );
        true
    }

    /// Register a streaming writer for a live request and hand back the
    /// receiving end for the response body. Fails on a duplicate identifier.
    pub fn register_live(&self, uuid: Uuid, framing: Framing) -> Option<mpsc::Receiver<Bytes>> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&uuid) {
            return None;
        }
        let (tx, rx) = mpsc::channel(LIVE_BODY_CAPACITY);
        let (done, _) = watch::channel(false);
        map.insert(
            uuid,
            Registration {
                writer: Writer::Live { tx, framing },
                done,
                cancel: CancellationToken::new(),
                error: None,
            },
        );
        Some(rx)
    }

    /// Deliver one chunk message to the registered writer. Empty non-eof
    /// payloads (the liveness probe) are accepted and dropped.
    pub async fn relay(&self, uuid: Uuid, msg: &LogStreamData) -> Result<(), RelayError> {
        // static writers and bookkeeping under the lock; live sends after
        let live = {
            let mut map = self.inner.lock().unwrap();
            let reg = map.get_mut(&uuid).ok_or(RelayError::NotRegistered)?;

            if msg.eof && !msg.error.is_empty() {
                reg.error = Some(msg.error.clone());
            }

            match &mut reg.writer {
                Writer::Static { body } => {
                    body.extend_from_slice(msg.data.as_bytes());
                    if msg.eof {
                        // send_replace: the value must stick even when the
                        // waiter has not subscribed yet
                        reg.done.send_replace(true);
                    } else if body.len() >= self.static_body_limit {
                        // cap hit: keep what arrived, wake the waiter,
                        // tell the sender to stop
                        reg.done.send_replace(true);
                        return Err(RelayError::LimitExceeded);
                    }
                    None
                }
                Writer::Live { tx, framing } => {
                    if msg.eof {
                        reg.done.send_replace(true);
                    }
                    Some((tx.clone(), *framing, msg.eof))
                }
            }
        };

        if let Some((tx, framing, eof)) = live {
            if !msg.data.is_empty() {
                let payload = match framing {
                    Framing::Raw => Bytes::from(msg.data.clone()),
                    Framing::EventStream => Bytes::from(frame_event_stream(&msg.data)),
                };
                if tx.send(payload).await.is_err() {
                    debug!(uuid = %uuid, "live client went away; dropping stream");
                    self.unregister(&uuid);
                    return Err(RelayError::ClientGone);
                }
            }
            // terminal frame: drop the writer so the response body ends.
            // Plain removal, not unregister: the cancellation handle must
            // not trip on a clean close racing the final acknowledgment.
            if eof {
                self.inner.lock().unwrap().remove(&uuid);
            }
        }
        Ok(())
    }

    /// Wait until the terminal frame arrives or the timeout passes. Returns
    /// whether the stream completed.
    pub async fn wait_for_completion(&self, uuid: &Uuid, timeout: Duration) -> bool {
        let mut done = {
            let map = self.inner.lock().unwrap();
            match map.get(uuid) {
                Some(reg) => reg.done.subscribe(),
                None => return false,
            }
        };
        if *done.borrow() {
            return true;
        }
        let completed = match tokio::time::timeout(timeout, done.wait_for(|d| *d)).await {
            Ok(Ok(_)) => true,
            // entry torn down while waiting, or the timeout passed
            Ok(Err(_)) | Err(_) => false,
        };
        completed
    }

    /// Take the buffered body of a static request, removing the entry.
    pub fn take_static_body(&self, uuid: &Uuid) -> Option<(Vec<u8>, Option<String>)> {
        let mut map = self.inner.lock().unwrap();
        let reg = map.remove(uuid)?;
        match reg.writer {
            Writer::Static { body } => Some((body, reg.error)),
            Writer::Live { .. } => {
                map.insert(
                    uuid.to_owned(),
                    Registration {
                        writer: reg.writer,
                        done: reg.done,
                        cancel: reg.cancel,
                        error: reg.error,
                    },
                );
                None
            }
        }
    }

    /// Remove the entry and trip its cancellation handle so the inbound
    /// RPC stream stops promptly, data in flight or not.
    pub fn unregister(&self, uuid: &Uuid) {
        if let Some(reg) = self.inner.lock().unwrap().remove(uuid) {
            reg.cancel.cancel();
        }
    }

    /// Cancellation handle for a registered stream; trips on unregister.
    pub fn cancellation(&self, uuid: &Uuid) -> Option<CancellationToken> {
        self.inner
            .lock()
            .unwrap()
            .get(uuid)
            .map(|reg| reg.cancel.clone())
    }

    pub fn is_registered(&self, uuid: &Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(uuid)
    }
}

/// Wrap a chunk payload as server-sent events, one event per line.
pub fn frame_event_stream(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 16);
    for line in payload.lines() {
        out.push_str("data: ");
        out.push_str(line);
        out.push_str("\n\n");
    }
    out
}
