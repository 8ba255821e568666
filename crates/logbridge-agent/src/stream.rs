//! Chunk streaming loops shared by the static and live paths.
//!
//! Both read the log source line by line, normalize, batch into bounded
//! chunks and flush on size or timer, so memory and latency stay bounded
//! independent of log volume.

use logbridge_core::{
    extract_timestamp, normalize_fragment, BridgeError, ChunkBuffer, LogRequest, FLUSH_INTERVAL,
    MAX_CHUNK_SIZE,
};
use logbridge_proto::LogStreamData;

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::source::LogByteStream;
use crate::transport::ChunkSink;

/// Per-read deadline on the live path; a stalled source must not block the
/// flush cycle.
pub const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Pause before re-reading after the live source reports end-of-input.
const EOF_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Grace period after the terminal frame so the principal observes it
/// before the channel closes.
pub const EOF_GRACE: Duration = Duration::from_millis(100);

/// Liveness probe: stream created, no data yet.
pub fn probe(uuid: Uuid) -> LogStreamData {
    LogStreamData {
        request_uuid: uuid.to_string(),
        data: String::new(),
        eof: false,
        error: String::new(),
    }
}

pub fn data_chunk(uuid: Uuid, payload: String) -> LogStreamData {
    LogStreamData {
        request_uuid: uuid.to_string(),
        data: payload,
        eof: false,
        error: String::new(),
    }
}

/// Terminal frame; the last message of a session.
pub fn terminal(uuid: Uuid, error: Option<&str>) -> LogStreamData {
    LogStreamData {
        request_uuid: uuid.to_string(),
        data: String::new(),
        eof: true,
        error: error.unwrap_or_default().to_string(),
    }
}

async fn flush(
    sink: &mut dyn ChunkSink,
    uuid: Uuid,
    buf: &mut ChunkBuffer,
) -> Result<(), BridgeError> {
    if let Some(payload) = buf.take() {
        sink.send(data_chunk(uuid, payload)).await?;
    }
    Ok(())
}

async fn push_lines(
    sink: &mut dyn ChunkSink,
    uuid: Uuid,
    buf: &mut ChunkBuffer,
    ready: &mut Vec<String>,
    fragment: &str,
) -> Result<(), BridgeError> {
    for line in normalize_fragment(fragment) {
        buf.push(&line, ready);
        for chunk in ready.drain(..) {
            sink.send(data_chunk(uuid, chunk)).await?;
        }
    }
    Ok(())
}

/// Stream all available (static) logs to the principal, then send the
/// terminal frame. Returns once the source is exhausted or on the first
/// error; mid-stream read failures are reported in the terminal frame.
pub async fn stream_to_completion(
    token: &CancellationToken,
    sink: &mut dyn ChunkSink,
    source: LogByteStream,
    req: &LogRequest,
) -> Result<(), BridgeError> {
    let mut reader = BufReader::new(source);
    let mut buf = ChunkBuffer::new(MAX_CHUNK_SIZE);
    let mut ready = Vec::new();
    let mut line = String::new();
    let mut last_flush = Instant::now();

    loop {
        line.clear();
        let n = tokio::select! {
            _ = token.cancelled() => {
                return Err(BridgeError::cancelled("log session cancelled"));
            }
            res = reader.read_line(&mut line) => match res {
                Ok(n) => n,
                Err(err) => {
                    let msg = err.to_string();
                    let _ = sink.send(terminal(req.uuid, Some(&msg))).await;
                    return Err(BridgeError::transient(msg));
                }
            },
        };
        if n == 0 {
            break;
        }

        push_lines(sink, req.uuid, &mut buf, &mut ready, &line).await?;

        if last_flush.elapsed() >= FLUSH_INTERVAL {
            flush(sink, req.uuid, &mut buf).await?;
            last_flush = Instant::now();
        }
    }

    // final flush & EOF
    flush(sink, req.uuid, &mut buf).await?;
    sink.send(terminal(req.uuid, None)).await?;
    Ok(())
}

/// Stream live logs until cancelled or the channel fails, updating the
/// resume cursor from timestamped lines along the way. End-of-input from
/// the source is not terminal here: the buffer is flushed and the read
/// retried, since the source keeps producing as the container does.
pub async fn stream_live(
    token: &CancellationToken,
    sink: &mut dyn ChunkSink,
    source: LogByteStream,
    req: &LogRequest,
    cursor: &mut Option<DateTime<Utc>>,
) -> Result<(), BridgeError> {
    let mut reader = BufReader::new(source);
    let mut buf = ChunkBuffer::new(MAX_CHUNK_SIZE);
    let mut ready = Vec::new();
    let mut line = String::new();
    let mut last_flush = Instant::now();

    loop {
        let read = tokio::select! {
            _ = token.cancelled() => {
                return Err(BridgeError::cancelled("log session cancelled"));
            }
            res = tokio::time::timeout(READ_DEADLINE, reader.read_line(&mut line)) => res,
        };

        match read {
            // read deadline hit; expected for idle tails, flush and keep going
            Err(_) => {
                // an idle tail never sends, so a closed channel has to be
                // noticed here; close_and_recv reports the real status
                if sink.is_closed() {
                    return Err(BridgeError::transient("log stream closed by peer"));
                }
                flush(sink, req.uuid, &mut buf).await?;
                last_flush = Instant::now();
                continue;
            }
            Ok(Ok(0)) => {
                flush(sink, req.uuid, &mut buf).await?;
                last_flush = Instant::now();
                if line.is_empty() {
                    tokio::time::sleep(EOF_RETRY_PAUSE).await;
                    continue;
                }
                // fall through to deliver the trailing partial line
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(BridgeError::transient(err.to_string())),
        }

        if req.timestamps && line.contains('T') {
            if let Some(ts) = extract_timestamp(&line) {
                *cursor = Some(ts);
            }
        }

        push_lines(sink, req.uuid, &mut buf, &mut ready, &line).await?;
        line.clear();

        if last_flush.elapsed() >= FLUSH_INTERVAL {
            flush(sink, req.uuid, &mut buf).await?;
            last_flush = Instant::now();
        }
    }
}
