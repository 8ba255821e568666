//! gRPC wire definitions for the log streaming channel.
//!
//! The agent opens a client-streaming `StreamLogs` call per log session,
//! pushes `LogStreamData` chunk messages, and receives one `LogStreamAck`
//! from the principal when it closes its side of the stream.

// Re-export for downstream convenience
pub use tonic;

/// Generated types and service code for the `logbridge.v1` package.
pub mod v1 {
    tonic::include_proto!("logbridge.v1");
}

// Client re-exports
pub use v1::log_stream_service_client::LogStreamServiceClient;

// Server re-exports
pub use v1::log_stream_service_server::{LogStreamService, LogStreamServiceServer};

pub use v1::{LogStreamAck, LogStreamData};
