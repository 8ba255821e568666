//! Core types for the log streaming bridge
//! this crate contains the request/event value types plus the pure pieces
//! shared by the agent and principal: line normalization, timestamp
//! extraction, chunk buffering and backoff.

pub mod chunk;
pub mod error;
pub mod events;
pub mod line;
pub mod retry;
pub mod timestamp;

pub use chunk::{ChunkBuffer, FLUSH_INTERVAL, MAX_CHUNK_SIZE};
pub use error::{BridgeError, ErrorKind};
pub use line::normalize_fragment;
pub use retry::{Backoff, BackoffPolicy};
pub use timestamp::extract_timestamp;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How far the resume request rewinds behind the last observed timestamp.
/// Deliberate overlap: a line read with coarse precision must not be lost,
/// duplicates across a reconnect are accepted.
pub const RESUME_OVERLAP_MS: i64 = 100;

// LOG REQUEST //

/// One user-initiated log fetch. Built by the gateway from query params,
/// travels by value over the event channel, read-only everywhere downstream.
/// The live resume path derives modified copies via [`LogRequest::resume_from`];
/// the original is never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    pub uuid: Uuid, // correlation key for the whole session

    pub namespace: String,
    pub pod: String,

    #[serde(default)]
    pub container: String,

    #[serde(default)]
    pub method: String, // HTTP method from the gateway; only GET is dispatched

    #[serde(default)]
    pub follow: bool,

    #[serde(default)]
    pub tail_lines: Option<i64>,

    #[serde(default)]
    pub since_seconds: Option<i64>,

    #[serde(default)]
    pub since_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub timestamps: bool,

    #[serde(default)]
    pub previous: bool,

    #[serde(default)]
    pub insecure_skip_tls_verify_backend: bool,

    #[serde(default)]
    pub limit_bytes: Option<i64>,

    #[serde(default)]
    pub pretty: bool,

    #[serde(default)]
    pub stream: Option<String>,
}

impl LogRequest {
    /// Create a request with a fresh identifier and default options.
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            namespace: namespace.into(),
            pod: pod.into(),
            container: String::new(),
            method: "GET".to_string(),
            follow: false,
            tail_lines: None,
            since_seconds: None,
            since_time: None,
            timestamps: false,
            previous: false,
            insecure_skip_tls_verify_backend: false,
            limit_bytes: None,
            pretty: false,
            stream: None,
        }
    }

    /// Copy of this request for a reconnect attempt, with since-time set to
    /// the resume cursor minus [`RESUME_OVERLAP_MS`]. Same identifier.
    /// Clears `since_seconds`; the pod log subresource rejects requests that
    /// carry both since fields.
    pub fn resume_from(&self, cursor: DateTime<Utc>) -> Self {
        let mut req = self.clone();
        req.since_time = Some(cursor - chrono::Duration::milliseconds(RESUME_OVERLAP_MS));
        req.since_seconds = None;
        req
    }
}
