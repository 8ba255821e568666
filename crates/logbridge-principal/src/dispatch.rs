//! Event dispatch to agents - publishes log request events on the agent's
//! queue and tracks which agents are alive from their heartbeats.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use logbridge_core::events::{request_subject, AgentStatus, STATUS_SUBJECT};
use logbridge_core::{BridgeError, ErrorKind, LogRequest};
use tracing::{debug, error, info};

/// An agent that has not heartbeated within this window counts as offline.
pub const AGENT_LIVENESS_WINDOW: Duration = Duration::from_secs(15);

#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Whether the named agent is currently reachable.
    fn is_connected(&self, agent: &str) -> bool;

    /// Publish a log request event to the agent's queue.
    async fn dispatch(&self, agent: &str, req: &LogRequest) -> Result<(), BridgeError>;
}

/// NATS-backed dispatcher. Liveness comes from the agents' heartbeat
/// subject, consumed by a background task.
pub struct NatsDispatcher {
    nats: async_nats::Client,
    last_seen: Arc<Mutex<HashMap<String, Instant>>>,
    liveness_window: Duration,
}

impl NatsDispatcher {
    pub async fn new(nats: async_nats::Client) -> Result<Self, BridgeError> {
        let last_seen: Arc<Mutex<HashMap<String, Instant>>> = Arc::default();

        let mut subscriber = nats
            .subscribe(STATUS_SUBJECT)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        let seen = last_seen.clone();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match serde_json::from_slice::<AgentStatus>(&message.payload) {
                    Ok(status) if status.online => {
                        debug!(agent = %status.agent, "agent heartbeat");
                        seen.lock().unwrap().insert(status.agent, Instant::now());
                    }
                    Ok(status) => {
                        info!(agent = %status.agent, "agent went offline");
                        seen.lock().unwrap().remove(&status.agent);
                    }
                    Err(e) => {
                        error!("Failed to parse agent status: {}", e);
                    }
                }
            }
        });

        Ok(Self {
            nats,
            last_seen,
            liveness_window: AGENT_LIVENESS_WINDOW,
        })
    }
}

#[async_trait]
impl EventDispatcher for NatsDispatcher {
    fn is_connected(&self, agent: &str) -> bool {
        self.last_seen
            .lock()
            .unwrap()
            .get(agent)
            .map(|seen| seen.elapsed() < self.liveness_window)
            .unwrap_or(false)
    }

    async fn dispatch(&self, agent: &str, req: &LogRequest) -> Result<(), BridgeError> {
        let payload = serde_json::to_vec(req).map_err(|e| BridgeError::internal(e.to_string()))?;
        self.nats
            .publish(request_subject(agent), payload.into())
            .await
            .map_err(|e| BridgeError::new(ErrorKind::AgentUnavailable, e.to_string()))?;
        debug!(agent = %agent, uuid = %req.uuid, "log request dispatched");
        Ok(())
    }
}
