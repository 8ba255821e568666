//! Event channel naming and agent liveness payloads.
//!
//! The per-agent queue itself is an external collaborator (at-least-once,
//! ordered per agent); these are just the subjects and value types both
//! sides agree on.

use serde::{Deserialize, Serialize};

/// Subject prefix for per-agent log request events.
pub const REQUEST_SUBJECT_PREFIX: &str = "logbridge.logs.request";

/// Subject agents publish their liveness heartbeats on.
pub const STATUS_SUBJECT: &str = "logbridge.agents.status";

/// Request event subject for a named agent.
pub fn request_subject(agent: &str) -> String {
    format!("{REQUEST_SUBJECT_PREFIX}.{agent}")
}

/// Heartbeat payload published by agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: String,
    pub online: bool,
}
