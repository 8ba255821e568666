use std::sync::Arc;

use logbridge_principal::{gateway, AppState, LogStreamRegistry, LogStreamServer, NatsDispatcher};
use logbridge_proto::LogStreamServiceServer;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let http_addr =
        std::env::var("LOGBRIDGE_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let grpc_addr =
        std::env::var("LOGBRIDGE_GRPC_ADDR").unwrap_or_else(|_| "0.0.0.0:50051".to_string());
    let nats_url =
        std::env::var("LOGBRIDGE_NATS_URL").unwrap_or_else(|_| "localhost:4222".to_string());

    //connect to NATS
    info!("Connecting to NATS...");
    let nats = async_nats::connect(&nats_url).await?;
    info!("Connected to NATS!");

    let registry = LogStreamRegistry::new();
    let dispatcher = Arc::new(NatsDispatcher::new(nats).await?);
    let state = Arc::new(AppState::new(registry.clone(), dispatcher));

    let app = gateway::router(state).layer(CorsLayer::permissive());

    info!("Starting HTTP gateway on {}", http_addr);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    let http = async { axum::serve(listener, app).await };

    info!("Starting log stream service on {}", grpc_addr);
    let grpc = tonic::transport::Server::builder()
        .add_service(LogStreamServiceServer::new(LogStreamServer::new(registry)))
        .serve(grpc_addr.parse()?);

    tokio::select! {
        result = http => result?,
        result = grpc => result?,
    }

    Ok(())
}
