//! Control-plane principal for the log streaming bridge.
//!
//! Exposes the Kubernetes-compatible pod log endpoint, forwards each request
//! as an event to the owning agent's queue, receives the chunked log stream
//! back over the streaming RPC service, and relays it to the HTTP client.

pub mod dispatch;
pub mod gateway;
pub mod registry;
pub mod rpc;

pub use dispatch::{EventDispatcher, NatsDispatcher};
pub use gateway::{router, AppState, PeerIdentity};
pub use registry::{Framing, LogStreamRegistry, RelayError};
pub use rpc::LogStreamServer;
