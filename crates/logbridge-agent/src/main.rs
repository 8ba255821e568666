use std::sync::Arc;

use logbridge_agent::{Agent, GrpcLogStreamTransport, KubeLogSource};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let agent_name = std::env::var("LOGBRIDGE_AGENT_NAME")
        .map_err(|_| "LOGBRIDGE_AGENT_NAME must be set")?;
    let nats_url =
        std::env::var("LOGBRIDGE_NATS_URL").unwrap_or_else(|_| "localhost:4222".to_string());
    let principal_url = std::env::var("LOGBRIDGE_PRINCIPAL_URL")
        .unwrap_or_else(|_| "http://localhost:50051".to_string());

    //connect to NATS
    info!("Connecting to NATS...");
    let nats = async_nats::connect(&nats_url).await?;
    info!("Connected to NATS!");

    //connect to the cluster
    info!("Connecting to Kubernetes...");
    let kube_client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes!");

    let transport = Arc::new(GrpcLogStreamTransport::connect(&principal_url)?);
    let source = Arc::new(KubeLogSource::new(kube_client));
    let agent = Arc::new(Agent::new(transport, source));

    info!(agent = %agent_name, principal = %principal_url, "Agent starting");
    logbridge_agent::events::run_event_loop(nats, &agent_name, agent).await?;

    Ok(())
}
