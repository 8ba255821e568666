//! NATS event loop - consumes log request events for this agent and
//! publishes liveness heartbeats so the principal knows we are here.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use logbridge_core::events::{request_subject, AgentStatus, STATUS_SUBJECT};
use logbridge_core::LogRequest;
use tracing::{error, info};

use crate::dispatch::Agent;

/// Heartbeat cadence. The principal marks an agent offline after missing a
/// few of these.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Subscribe to this agent's request subject and dispatch every decoded
/// event. Runs until the subscription ends. Decode and dispatch failures
/// are logged and skipped; one bad event must not take the loop down.
pub async fn run_event_loop(
    nats: async_nats::Client,
    agent_name: &str,
    agent: Arc<Agent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subject = request_subject(agent_name);
    info!(subject = %subject, "Subscribing to log request events...");
    let mut subscriber = nats.subscribe(subject).await?;

    tokio::spawn(heartbeat_loop(nats.clone(), agent_name.to_string()));

    while let Some(message) = subscriber.next().await {
        match serde_json::from_slice::<LogRequest>(&message.payload) {
            Ok(req) => {
                if let Err(e) = agent.process_log_request(req).await {
                    error!("Failed to process log request: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to parse log request event: {}", e);
            }
        }
    }
    Ok(())
}

async fn heartbeat_loop(nats: async_nats::Client, agent: String) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        ticker.tick().await;
        let status = AgentStatus {
            agent: agent.clone(),
            online: true,
        };
        let payload = match serde_json::to_vec(&status) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to encode heartbeat: {}", e);
                continue;
            }
        };
        if let Err(e) = nats.publish(STATUS_SUBJECT, payload.into()).await {
            error!("Failed to publish heartbeat: {}", e);
        }
    }
}
