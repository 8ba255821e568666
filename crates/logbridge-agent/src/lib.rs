//! Cluster-side agent for the log streaming bridge.
//!
//! Receives log request events from the principal's per-agent queue, opens
//! the pod log source, and relays chunked lines back over the streaming RPC
//! channel. Static requests run to completion; live (follow) requests run as
//! detached sessions with reconnect/resume.

pub mod dispatch;
pub mod events;
pub mod inflight;
pub mod resume;
pub mod source;
pub mod stream;
pub mod transport;

pub use dispatch::{Agent, ConnectionState};
pub use inflight::InflightLogs;
pub use resume::LiveSession;
pub use source::{KubeLogSource, LogByteStream, LogSource};
pub use transport::{ChunkSink, GrpcLogStreamTransport, LogStreamTransport};
